//! Append-only audit record of a gateway webhook delivery.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a stored webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookEventId(Uuid);

impl WebhookEventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for WebhookEventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WebhookEventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A verified webhook delivery, stored before any business logic runs.
///
/// Only `processed` ever changes, and only from false to true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: WebhookEventId,
    pub order_id: OrderId,
    pub event_type: String,
    /// Gateway status string, verbatim.
    pub order_status: String,
    pub raw_payload: String,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
}

impl WebhookEvent {
    /// Creates an unprocessed record for a delivery received now.
    pub fn received(
        order_id: OrderId,
        event_type: impl Into<String>,
        order_status: impl Into<String>,
        raw_payload: impl Into<String>,
    ) -> Self {
        Self {
            id: WebhookEventId::new(),
            order_id,
            event_type: event_type.into(),
            order_status: order_status.into(),
            raw_payload: raw_payload.into(),
            received_at: Utc::now(),
            processed: false,
        }
    }

    /// Returns true if `other` reports the same change for the same order.
    pub fn same_change_as(&self, other: &WebhookEvent) -> bool {
        self.order_id == other.order_id
            && self.event_type == other.event_type
            && self.order_status.eq_ignore_ascii_case(&other.order_status)
    }
}
