//! Order payment and shipment statuses.

use serde::{Deserialize, Serialize};

/// Payment status of an order.
///
/// State transitions:
/// ```text
/// Pending ──► Active ──┬──► Paid ──► Refunded
///    │          │      ├──► Expired
///    └──────────┴──────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Order row written, gateway session not yet open.
    #[default]
    Pending,

    /// Gateway session open, awaiting payment.
    Active,

    /// Payment captured.
    Paid,

    /// Session expired without payment (terminal state).
    Expired,

    /// Session cancelled (terminal state).
    Cancelled,

    /// Payment refunded (terminal state).
    Refunded,
}

impl PaymentStatus {
    /// Returns true while the order is still awaiting payment.
    pub fn is_open(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Active)
    }

    /// Returns true once payment has been settled one way or the other.
    /// A settled order never goes back to Pending or Active.
    pub fn is_settled(&self) -> bool {
        !self.is_open()
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Expired | PaymentStatus::Cancelled | PaymentStatus::Refunded
        )
    }

    /// Returns the storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Active => "ACTIVE",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Expired => "EXPIRED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    /// Parses a storage name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(PaymentStatus::Pending),
            "ACTIVE" => Some(PaymentStatus::Active),
            "PAID" => Some(PaymentStatus::Paid),
            "EXPIRED" => Some(PaymentStatus::Expired),
            "CANCELLED" => Some(PaymentStatus::Cancelled),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shipment status of an order.
///
/// `Created` is entered at most once per order; the waybill recorded with it
/// is the idempotency guard for booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    /// No booking made yet.
    #[default]
    Unshipped,

    /// Carrier booking succeeded, waybill assigned.
    Created,

    /// Carrier booking failed; needs a retry or manual action.
    Failed,

    /// Picked up by the carrier.
    InTransit,

    /// Delivered to the customer.
    Delivered,
}

impl ShipmentStatus {
    /// Returns true if a booking may still be attempted.
    pub fn can_book(&self) -> bool {
        matches!(self, ShipmentStatus::Unshipped | ShipmentStatus::Failed)
    }

    /// Returns the storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Unshipped => "UNSHIPPED",
            ShipmentStatus::Created => "CREATED",
            ShipmentStatus::Failed => "FAILED",
            ShipmentStatus::InTransit => "IN_TRANSIT",
            ShipmentStatus::Delivered => "DELIVERED",
        }
    }

    /// Parses a storage name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "UNSHIPPED" => Some(ShipmentStatus::Unshipped),
            "CREATED" => Some(ShipmentStatus::Created),
            "FAILED" => Some(ShipmentStatus::Failed),
            "IN_TRANSIT" => Some(ShipmentStatus::InTransit),
            "DELIVERED" => Some(ShipmentStatus::Delivered),
            _ => None,
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PAYMENT: [PaymentStatus; 6] = [
        PaymentStatus::Pending,
        PaymentStatus::Active,
        PaymentStatus::Paid,
        PaymentStatus::Expired,
        PaymentStatus::Cancelled,
        PaymentStatus::Refunded,
    ];

    #[test]
    fn test_default_states() {
        assert_eq!(PaymentStatus::default(), PaymentStatus::Pending);
        assert_eq!(ShipmentStatus::default(), ShipmentStatus::Unshipped);
    }

    #[test]
    fn test_open_and_settled() {
        assert!(PaymentStatus::Pending.is_open());
        assert!(PaymentStatus::Active.is_open());
        assert!(PaymentStatus::Paid.is_settled());
        assert!(PaymentStatus::Expired.is_settled());
        assert!(PaymentStatus::Cancelled.is_settled());
        assert!(PaymentStatus::Refunded.is_settled());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PaymentStatus::Paid.is_terminal());
        assert!(PaymentStatus::Expired.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
        assert!(PaymentStatus::Refunded.is_terminal());
    }

    #[test]
    fn test_storage_names_roundtrip() {
        for status in ALL_PAYMENT {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
        for status in [
            ShipmentStatus::Unshipped,
            ShipmentStatus::Created,
            ShipmentStatus::Failed,
            ShipmentStatus::InTransit,
            ShipmentStatus::Delivered,
        ] {
            assert_eq!(ShipmentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PaymentStatus::parse("paid"), None);
    }

    #[test]
    fn test_can_book() {
        assert!(ShipmentStatus::Unshipped.can_book());
        assert!(ShipmentStatus::Failed.can_book());
        assert!(!ShipmentStatus::Created.can_book());
        assert!(!ShipmentStatus::InTransit.can_book());
        assert!(!ShipmentStatus::Delivered.can_book());
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&ShipmentStatus::InTransit).unwrap();
        assert_eq!(json, "\"IN_TRANSIT\"");
        let deserialized: PaymentStatus = serde_json::from_str("\"PAID\"").unwrap();
        assert_eq!(deserialized, PaymentStatus::Paid);
    }
}
