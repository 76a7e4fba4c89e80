use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Order, PaymentStatus, WebhookEvent, WebhookEventId};
use uuid::Uuid;

use crate::Result;

/// Proof that the caller holds the right to book a shipment for an order.
///
/// Only one live claim exists per order. A claim older than the lease may
/// be taken over, so a process that died mid-booking does not block the
/// order forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipmentClaim {
    pub token: Uuid,
    pub claimed_at: DateTime<Utc>,
}

impl ShipmentClaim {
    pub(crate) fn new() -> Self {
        Self {
            token: Uuid::new_v4(),
            claimed_at: Utc::now(),
        }
    }
}

/// Core trait for order store implementations.
///
/// All implementations must be thread-safe (Send + Sync) and must enforce
/// the conditional updates themselves; callers never hold a lock.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order.
    ///
    /// Fails with `DuplicateOrder` if the id is taken.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Loads an order by id.
    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>>;

    /// Deletes an order. Used only to undo a failed intake.
    ///
    /// Returns true if a row was removed.
    async fn delete_order(&self, id: &OrderId) -> Result<bool>;

    /// Moves the payment status from `expected` to `next`.
    ///
    /// Returns false, changing nothing, if the current status is not
    /// `expected`. Fails with `NotFound` if the order does not exist.
    async fn update_payment_status(
        &self,
        id: &OrderId,
        expected: PaymentStatus,
        next: PaymentStatus,
        gateway_status: &str,
    ) -> Result<bool>;

    /// Records the latest raw gateway status without touching the payment status.
    async fn record_gateway_status(&self, id: &OrderId, gateway_status: &str) -> Result<()>;

    /// Claims the right to book a shipment.
    ///
    /// Returns `None` if the order already has a waybill or another claim
    /// younger than `lease` is live.
    async fn claim_shipment(&self, id: &OrderId, lease: Duration)
    -> Result<Option<ShipmentClaim>>;

    /// Stores the waybill and marks the shipment `Created`.
    ///
    /// Succeeds only while `claim` is still held and no waybill exists.
    async fn record_waybill(
        &self,
        id: &OrderId,
        claim: &ShipmentClaim,
        waybill: &str,
    ) -> Result<bool>;

    /// Marks the shipment `Failed` with a reason and releases the claim.
    async fn record_shipment_failure(
        &self,
        id: &OrderId,
        claim: &ShipmentClaim,
        reason: &str,
    ) -> Result<bool>;

    /// Appends a webhook delivery to the audit log.
    async fn insert_webhook_event(&self, event: &WebhookEvent) -> Result<()>;

    /// Flags a stored delivery as processed.
    async fn mark_webhook_processed(&self, id: WebhookEventId) -> Result<()>;

    /// Returns true if a processed delivery reported the same change already.
    async fn is_event_processed(
        &self,
        order_id: &OrderId,
        event_type: &str,
        order_status: &str,
    ) -> Result<bool>;

    /// Returns all deliveries for an order, oldest first.
    async fn webhook_events_for_order(&self, order_id: &OrderId) -> Result<Vec<WebhookEvent>>;
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Loads an order, failing with `NotFound` if it does not exist.
    async fn require_order(&self, id: &OrderId) -> Result<Order> {
        self.get_order(id)
            .await?
            .ok_or_else(|| crate::StoreError::NotFound(id.clone()))
    }
}

impl<T: OrderStore + ?Sized> OrderStoreExt for T {}

/// Lets a shared, type-erased store stand in wherever a store is expected.
#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for std::sync::Arc<T> {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        (**self).insert_order(order).await
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        (**self).get_order(id).await
    }

    async fn delete_order(&self, id: &OrderId) -> Result<bool> {
        (**self).delete_order(id).await
    }

    async fn update_payment_status(
        &self,
        id: &OrderId,
        expected: PaymentStatus,
        next: PaymentStatus,
        gateway_status: &str,
    ) -> Result<bool> {
        (**self)
            .update_payment_status(id, expected, next, gateway_status)
            .await
    }

    async fn record_gateway_status(&self, id: &OrderId, gateway_status: &str) -> Result<()> {
        (**self).record_gateway_status(id, gateway_status).await
    }

    async fn claim_shipment(
        &self,
        id: &OrderId,
        lease: Duration,
    ) -> Result<Option<ShipmentClaim>> {
        (**self).claim_shipment(id, lease).await
    }

    async fn record_waybill(
        &self,
        id: &OrderId,
        claim: &ShipmentClaim,
        waybill: &str,
    ) -> Result<bool> {
        (**self).record_waybill(id, claim, waybill).await
    }

    async fn record_shipment_failure(
        &self,
        id: &OrderId,
        claim: &ShipmentClaim,
        reason: &str,
    ) -> Result<bool> {
        (**self).record_shipment_failure(id, claim, reason).await
    }

    async fn insert_webhook_event(&self, event: &WebhookEvent) -> Result<()> {
        (**self).insert_webhook_event(event).await
    }

    async fn mark_webhook_processed(&self, id: WebhookEventId) -> Result<()> {
        (**self).mark_webhook_processed(id).await
    }

    async fn is_event_processed(
        &self,
        order_id: &OrderId,
        event_type: &str,
        order_status: &str,
    ) -> Result<bool> {
        (**self)
            .is_event_processed(order_id, event_type, order_status)
            .await
    }

    async fn webhook_events_for_order(&self, order_id: &OrderId) -> Result<Vec<WebhookEvent>> {
        (**self).webhook_events_for_order(order_id).await
    }
}
