//! Payment gateway webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use fulfillment::services::{Carrier, PaymentGateway};
use order_store::OrderStore;
use serde::Serialize;

use super::orders::AppState;
use crate::error::ApiError;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

#[derive(Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /webhooks/payment: verify and apply a gateway delivery.
///
/// Any verified delivery is acknowledged with 200, including ones that
/// were ignored or whose shipment booking failed.
pub async fn payment<S, G, C>(
    State(state): State<Arc<AppState<S, G, C>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError>
where
    S: OrderStore + Clone + 'static,
    G: PaymentGateway + 'static,
    C: Carrier + 'static,
{
    let outcome = state
        .webhooks
        .handle(
            &body,
            header(&headers, SIGNATURE_HEADER),
            header(&headers, TIMESTAMP_HEADER),
        )
        .await?;

    Ok(Json(WebhookAck {
        status: outcome.as_str(),
    }))
}
