//! Order intake and order lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, OrderId};
use domain::{CustomerDetails, OrderItem, OrderSnapshot, PaymentMethod, PostalAddress};
use fulfillment::services::{Carrier, PaymentGateway};
use fulfillment::{
    CreateOrderRequest, FulfillmentError, IntakeReceipt, OrderIntake, PincodeServiceabilityChecker,
    ReconciliationResolver, WebhookIngress,
};
use order_store::OrderStore;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S, G, C>
where
    S: OrderStore + Clone,
    G: PaymentGateway,
    C: Carrier,
{
    pub intake: OrderIntake<S, G>,
    pub webhooks: WebhookIngress<S, C>,
    pub resolver: ReconciliationResolver,
    pub serviceability: PincodeServiceabilityChecker<C>,
}

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderBody {
    /// Total shown to the shopper; checked against the computed total.
    #[serde(default)]
    pub amount_major_units: Option<Decimal>,
    pub customer: CustomerBody,
    pub items: Vec<OrderItemBody>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    pub return_target: String,
}

#[derive(Deserialize)]
pub struct CustomerBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: Option<PostalAddress>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemBody {
    pub product_id: String,
    pub name: String,
    pub unit_price_major_units: Decimal,
    pub quantity: u32,
}

impl CreateOrderBody {
    fn into_request(self) -> Result<CreateOrderRequest, FulfillmentError> {
        let items = self
            .items
            .into_iter()
            .map(|item| {
                Ok(OrderItem::new(
                    item.product_id,
                    item.name,
                    item.quantity,
                    Money::from_major(item.unit_price_major_units)?,
                ))
            })
            .collect::<Result<Vec<_>, FulfillmentError>>()?;

        Ok(CreateOrderRequest {
            customer: CustomerDetails {
                name: self.customer.name,
                email: self.customer.email,
                phone: self.customer.phone,
                address: self.customer.address,
            },
            items,
            payment_method: self.payment_method,
            return_target: self.return_target,
            amount_major: self.amount_major_units,
        })
    }
}

// -- Handlers --

/// POST /orders: price the cart, store the order, and open a payment session.
#[tracing::instrument(skip(state, body))]
pub async fn create<S, G, C>(
    State(state): State<Arc<AppState<S, G, C>>>,
    body: Result<Json<CreateOrderBody>, JsonRejection>,
) -> Result<(StatusCode, Json<IntakeReceipt>), ApiError>
where
    S: OrderStore + Clone + 'static,
    G: PaymentGateway + 'static,
    C: Carrier + 'static,
{
    let Json(body) = body?;
    let request = body.into_request()?;
    let receipt = state.intake.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /orders/{id}: resolve an order from the cache, the store, or the gateway.
#[tracing::instrument(skip(state))]
pub async fn get<S, G, C>(
    State(state): State<Arc<AppState<S, G, C>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderSnapshot>, ApiError>
where
    S: OrderStore + Clone + 'static,
    G: PaymentGateway + 'static,
    C: Carrier + 'static,
{
    let order_id = OrderId::parse(id).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let snapshot = state.resolver.resolve(&order_id).await?;
    Ok(Json(snapshot))
}
