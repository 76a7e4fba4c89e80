//! Pincode serviceability endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use fulfillment::services::{Carrier, PaymentGateway};
use fulfillment::{ServiceabilityQuery, ServiceabilityResult, estimated_weight_kg};
use order_store::OrderStore;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::orders::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct ServiceabilityParams {
    pub weight_kg: Option<Decimal>,
    #[serde(default)]
    pub cod: bool,
    pub cod_amount: Option<Decimal>,
}

/// GET /pincodes/{pincode}/serviceability: can the carrier deliver there?
#[tracing::instrument(skip(state, params))]
pub async fn serviceability<S, G, C>(
    State(state): State<Arc<AppState<S, G, C>>>,
    Path(pincode): Path<String>,
    params: Result<Query<ServiceabilityParams>, QueryRejection>,
) -> Result<Json<ServiceabilityResult>, ApiError>
where
    S: OrderStore + Clone + 'static,
    G: PaymentGateway + 'static,
    C: Carrier + 'static,
{
    let Query(params) = params?;
    let weight_kg = params.weight_kg.unwrap_or_else(|| estimated_weight_kg(1));
    if weight_kg <= Decimal::ZERO {
        return Err(ApiError::BadRequest(format!(
            "weight_kg must be positive, got {weight_kg}"
        )));
    }

    let query = ServiceabilityQuery {
        weight_kg,
        cod: params.cod,
        cod_amount: params.cod_amount,
    };
    let result = state.serviceability.check(&pincode, &query).await?;
    Ok(Json(result))
}
