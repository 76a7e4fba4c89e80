//! Payment webhook ingress.
//!
//! Deliveries are verified, recorded, and then applied to the order's
//! payment status through the store's compare-and-set. A PAID transition
//! hands the order to the [`ShipmentDispatcher`].

use common::OrderId;
use domain::{
    GatewayOrderStatus, Order, PaymentStatus, Pincode, PostalAddress, Transition, WebhookEvent,
    next_payment_status,
};
use order_store::{OrderStore, OrderStoreExt};
use serde::Deserialize;
use serde_json::Value;

use crate::dispatcher::{DispatchOutcome, ShipmentDispatcher};
use crate::error::FulfillmentError;
use crate::reconciliation::SnapshotCache;
use crate::services::Carrier;
use crate::signature::SignatureVerifier;

/// Attempts at the payment compare-and-set before giving up.
const MAX_TRANSITION_ATTEMPTS: usize = 8;

const DEFAULT_EVENT_TYPE: &str = "PAYMENT_STATUS";

/// Body of a gateway webhook delivery.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub order_id: String,
    pub order_status: String,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub payment_details: Option<Value>,
    #[serde(default)]
    pub shipping_address: Option<Value>,
    #[serde(default)]
    pub billing_address: Option<Value>,
}

impl WebhookPayload {
    pub fn event_type(&self) -> &str {
        self.event_type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_EVENT_TYPE)
    }

    /// Reads the shipping address, falling back to the billing address.
    /// Unparseable addresses are ignored.
    pub fn address(&self) -> Option<PostalAddress> {
        [&self.shipping_address, &self.billing_address]
            .into_iter()
            .flatten()
            .find_map(lenient_address)
    }
}

/// Address keys as different gateway versions spell them.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LooseAddress {
    #[serde(alias = "addressLine1", alias = "address")]
    line1: Option<String>,
    #[serde(alias = "addressLine2")]
    line2: Option<String>,
    city: Option<String>,
    state: Option<String>,
    #[serde(alias = "postalCode", alias = "zip")]
    pincode: Option<Value>,
    country: Option<String>,
}

fn lenient_address(value: &Value) -> Option<PostalAddress> {
    let loose: LooseAddress = serde_json::from_value(value.clone()).ok()?;
    let pincode = match loose.pincode? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty());

    Some(PostalAddress {
        line1: non_empty(loose.line1)?,
        line2: non_empty(loose.line2),
        city: non_empty(loose.city)?,
        state: non_empty(loose.state)?,
        pincode: Pincode::parse(&pincode).ok()?,
        country: non_empty(loose.country).unwrap_or_else(|| "India".to_string()),
    })
}

/// What a verified delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The payment status moved forward.
    Applied {
        from: PaymentStatus,
        to: PaymentStatus,
        shipment: Option<DispatchOutcome>,
    },
    /// The order was already in the reported status.
    Redelivered {
        status: PaymentStatus,
        shipment: Option<DispatchOutcome>,
    },
    /// The event would have moved the order backwards or reopened it.
    Rejected {
        current: PaymentStatus,
        attempted: PaymentStatus,
    },
    /// The gateway sent a status this service does not act on.
    Unrecognized(String),
    /// The same change was processed before.
    AlreadyProcessed,
    /// No such order; the delivery is recorded for manual review.
    UnknownOrder,
}

impl WebhookOutcome {
    /// Returns the metric label for this outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied { .. } => "applied",
            WebhookOutcome::Redelivered { .. } => "redelivered",
            WebhookOutcome::Rejected { .. } => "rejected",
            WebhookOutcome::Unrecognized(_) => "unrecognized",
            WebhookOutcome::AlreadyProcessed => "already_processed",
            WebhookOutcome::UnknownOrder => "unknown_order",
        }
    }

    /// Returns the shipment attempt triggered by this delivery, if any.
    pub fn shipment(&self) -> Option<&DispatchOutcome> {
        match self {
            WebhookOutcome::Applied { shipment, .. }
            | WebhookOutcome::Redelivered { shipment, .. } => shipment.as_ref(),
            _ => None,
        }
    }
}

/// Entry point for payment gateway webhooks.
pub struct WebhookIngress<S: OrderStore + Clone, C: Carrier> {
    store: S,
    dispatcher: ShipmentDispatcher<S, C>,
    cache: SnapshotCache,
    verifier: SignatureVerifier,
}

impl<S: OrderStore + Clone, C: Carrier> WebhookIngress<S, C> {
    pub fn new(
        store: S,
        dispatcher: ShipmentDispatcher<S, C>,
        cache: SnapshotCache,
        verifier: SignatureVerifier,
    ) -> Self {
        Self {
            store,
            dispatcher,
            cache,
            verifier,
        }
    }

    /// Verifies and applies one delivery.
    ///
    /// Signature failures are returned before the body is looked at. After
    /// that the delivery is recorded before any state changes, and shipment
    /// booking failures never turn into errors.
    #[tracing::instrument(skip_all)]
    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
    ) -> Result<WebhookOutcome, FulfillmentError> {
        if let Err(e) = self.verifier.verify(raw_body, signature, timestamp) {
            metrics::counter!("webhook_signature_failures_total").increment(1);
            tracing::warn!(target: "security", error = %e, "rejected webhook delivery");
            return Err(e.into());
        }

        let result = self.process(raw_body).await;
        let label = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "error",
        };
        metrics::counter!("webhooks_received_total", "outcome" => label).increment(1);
        result
    }

    async fn process(&self, raw_body: &[u8]) -> Result<WebhookOutcome, FulfillmentError> {
        let body = std::str::from_utf8(raw_body)
            .map_err(|_| FulfillmentError::Malformed("body is not UTF-8".to_string()))?;
        let payload: WebhookPayload = serde_json::from_str(body)
            .map_err(|e| FulfillmentError::Malformed(e.to_string()))?;
        let order_id = OrderId::parse(payload.order_id.as_str())
            .map_err(|e| FulfillmentError::Malformed(e.to_string()))?;

        let event = WebhookEvent::received(
            order_id.clone(),
            payload.event_type(),
            payload.order_status.as_str(),
            body,
        );
        self.store.insert_webhook_event(&event).await?;

        tracing::info!(
            order_id = %order_id,
            event_id = %event.id,
            order_status = %payload.order_status,
            "webhook received"
        );

        let Some(order) = self.store.get_order(&order_id).await? else {
            tracing::warn!(order_id = %order_id, event_id = %event.id, "webhook for unknown order");
            return Ok(WebhookOutcome::UnknownOrder);
        };

        let incoming = GatewayOrderStatus::parse(&payload.order_status);

        let outcome = match self.ensure_unprocessed(&order, &event, &incoming).await {
            Ok(()) => self.apply(order, &incoming, &payload).await?,
            Err(FulfillmentError::Conflict(reason)) => {
                tracing::info!(order_id = %order_id, %reason, "duplicate webhook ignored");
                WebhookOutcome::AlreadyProcessed
            }
            Err(e) => return Err(e),
        };

        self.store.mark_webhook_processed(event.id).await?;
        Ok(outcome)
    }

    /// Fails with `Conflict` if the same change was processed before.
    ///
    /// A repeated PAID for an order that still has no waybill goes through,
    /// so a redelivery can retry a failed booking.
    async fn ensure_unprocessed(
        &self,
        order: &Order,
        event: &WebhookEvent,
        incoming: &GatewayOrderStatus,
    ) -> Result<(), FulfillmentError> {
        let seen = self
            .store
            .is_event_processed(&order.id, &event.event_type, &event.order_status)
            .await?;
        let retry_booking = *incoming == GatewayOrderStatus::Paid
            && order.payment_status == PaymentStatus::Paid
            && !order.has_waybill();

        if seen && !retry_booking {
            return Err(FulfillmentError::Conflict(format!(
                "{} {} already processed for order {}",
                event.event_type, event.order_status, order.id
            )));
        }
        Ok(())
    }

    async fn apply(
        &self,
        mut order: Order,
        incoming: &GatewayOrderStatus,
        payload: &WebhookPayload,
    ) -> Result<WebhookOutcome, FulfillmentError> {
        let raw_status = payload.order_status.as_str();
        let mut attempts = 0;

        let transition = loop {
            let transition = next_payment_status(order.payment_status, incoming);
            let Some(to) = transition.new_status() else {
                break transition;
            };

            if self
                .store
                .update_payment_status(&order.id, order.payment_status, to, raw_status)
                .await?
            {
                order.payment_status = to;
                order.gateway_status = Some(raw_status.to_string());
                self.cache.invalidate(&order.id).await;
                break transition;
            }

            attempts += 1;
            if attempts >= MAX_TRANSITION_ATTEMPTS {
                tracing::error!(order_id = %order.id, attempts, "payment status kept changing");
                return Err(FulfillmentError::Contention(order.id));
            }
            tracing::debug!(order_id = %order.id, attempts, "lost payment status race, reloading");
            order = self.store.require_order(&order.id).await?;
        };

        if transition.new_status().is_none() {
            self.store.record_gateway_status(&order.id, raw_status).await?;
        }

        let shipment = if transition.requires_shipment() {
            Some(
                self.dispatcher
                    .dispatch(&order, payload.address().as_ref())
                    .await,
            )
        } else {
            None
        };

        let outcome = match transition {
            Transition::Advance { from, to } => {
                tracing::info!(order_id = %order.id, %from, %to, "payment status updated");
                WebhookOutcome::Applied { from, to, shipment }
            }
            Transition::Redelivered(status) => WebhookOutcome::Redelivered { status, shipment },
            Transition::Rejected { current, attempted } => {
                if attempted == PaymentStatus::Paid {
                    tracing::error!(
                        order_id = %order.id,
                        %current,
                        "payment captured for a closed order; needs manual reconciliation"
                    );
                } else {
                    tracing::warn!(
                        order_id = %order.id,
                        %current,
                        %attempted,
                        "ignored out-of-order payment status"
                    );
                }
                WebhookOutcome::Rejected { current, attempted }
            }
            Transition::Unrecognized(raw) => {
                tracing::warn!(order_id = %order.id, status = %raw, "unrecognized payment status");
                WebhookOutcome::Unrecognized(raw)
            }
        };

        Ok(outcome)
    }
}
