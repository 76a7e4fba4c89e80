use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use common::OrderId;
use domain::{Order, PaymentStatus, ShipmentStatus, WebhookEvent, WebhookEventId};
use tokio::sync::RwLock;

use crate::{OrderStore, Result, ShipmentClaim, StoreError};

struct StoredOrder {
    order: Order,
    claim: Option<ShipmentClaim>,
}

#[derive(Default)]
struct State {
    orders: HashMap<OrderId, StoredOrder>,
    webhook_events: Vec<WebhookEvent>,
    fail_on_insert: bool,
    fail_on_payment_update: bool,
}

/// In-memory order store for tests and local runs.
///
/// Implements the same conditional updates as the PostgreSQL store, each
/// under a single write lock.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `insert_order` fail.
    pub async fn set_fail_on_insert(&self, fail: bool) {
        self.state.write().await.fail_on_insert = fail;
    }

    /// Makes `update_payment_status` fail.
    pub async fn set_fail_on_payment_update(&self, fail: bool) {
        self.state.write().await.fail_on_payment_update = fail;
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the number of stored webhook deliveries.
    pub async fn webhook_event_count(&self) -> usize {
        self.state.read().await.webhook_events.len()
    }

    /// Clears all orders and webhook deliveries.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.orders.clear();
        state.webhook_events.clear();
    }
}

fn simulated_failure(operation: &str) -> StoreError {
    StoreError::Database(sqlx::Error::Protocol(format!(
        "simulated {operation} failure"
    )))
}

fn claim_is_live(claim: &ShipmentClaim, lease: Duration) -> bool {
    let lease = TimeDelta::from_std(lease).unwrap_or(TimeDelta::MAX);
    Utc::now() - claim.claimed_at < lease
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_on_insert {
            return Err(simulated_failure("insert"));
        }
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateOrder(order.id.clone()));
        }
        state.orders.insert(
            order.id.clone(),
            StoredOrder {
                order: order.clone(),
                claim: None,
            },
        );
        Ok(())
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(id).map(|stored| stored.order.clone()))
    }

    async fn delete_order(&self, id: &OrderId) -> Result<bool> {
        Ok(self.state.write().await.orders.remove(id).is_some())
    }

    async fn update_payment_status(
        &self,
        id: &OrderId,
        expected: PaymentStatus,
        next: PaymentStatus,
        gateway_status: &str,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.fail_on_payment_update {
            return Err(simulated_failure("payment update"));
        }
        let stored = state
            .orders
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if stored.order.payment_status != expected {
            return Ok(false);
        }
        stored.order.payment_status = next;
        stored.order.gateway_status = Some(gateway_status.to_string());
        stored.order.updated_at = Utc::now();
        Ok(true)
    }

    async fn record_gateway_status(&self, id: &OrderId, gateway_status: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .orders
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        stored.order.gateway_status = Some(gateway_status.to_string());
        stored.order.updated_at = Utc::now();
        Ok(())
    }

    async fn claim_shipment(
        &self,
        id: &OrderId,
        lease: Duration,
    ) -> Result<Option<ShipmentClaim>> {
        let mut state = self.state.write().await;
        let stored = state
            .orders
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if stored.order.waybill.is_some() {
            return Ok(None);
        }
        if let Some(existing) = &stored.claim
            && claim_is_live(existing, lease)
        {
            return Ok(None);
        }

        let claim = ShipmentClaim::new();
        stored.claim = Some(claim);
        Ok(Some(claim))
    }

    async fn record_waybill(
        &self,
        id: &OrderId,
        claim: &ShipmentClaim,
        waybill: &str,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let stored = state
            .orders
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if stored.order.waybill.is_some() || stored.claim.map(|c| c.token) != Some(claim.token) {
            return Ok(false);
        }
        stored.order.waybill = Some(waybill.to_string());
        stored.order.shipment_status = ShipmentStatus::Created;
        stored.order.shipment_error = None;
        stored.order.updated_at = Utc::now();
        stored.claim = None;
        Ok(true)
    }

    async fn record_shipment_failure(
        &self,
        id: &OrderId,
        claim: &ShipmentClaim,
        reason: &str,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let stored = state
            .orders
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if stored.order.waybill.is_some() || stored.claim.map(|c| c.token) != Some(claim.token) {
            return Ok(false);
        }
        stored.order.shipment_status = ShipmentStatus::Failed;
        stored.order.shipment_error = Some(reason.to_string());
        stored.order.updated_at = Utc::now();
        stored.claim = None;
        Ok(true)
    }

    async fn insert_webhook_event(&self, event: &WebhookEvent) -> Result<()> {
        self.state.write().await.webhook_events.push(event.clone());
        Ok(())
    }

    async fn mark_webhook_processed(&self, id: WebhookEventId) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(event) = state.webhook_events.iter_mut().find(|e| e.id == id) {
            event.processed = true;
        }
        Ok(())
    }

    async fn is_event_processed(
        &self,
        order_id: &OrderId,
        event_type: &str,
        order_status: &str,
    ) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.webhook_events.iter().any(|e| {
            e.processed
                && &e.order_id == order_id
                && e.event_type == event_type
                && e.order_status.eq_ignore_ascii_case(order_status)
        }))
    }

    async fn webhook_events_for_order(&self, order_id: &OrderId) -> Result<Vec<WebhookEvent>> {
        let state = self.state.read().await;
        let mut events: Vec<_> = state
            .webhook_events
            .iter()
            .filter(|e| &e.order_id == order_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.received_at);
        Ok(events)
    }
}
