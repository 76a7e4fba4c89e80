//! Payment state machine driven by gateway events.
//!
//! | Current           | Event     | Result                   |
//! |-------------------|-----------|--------------------------|
//! | Pending/Active    | PAID      | Paid (books a shipment)  |
//! | Pending/Active    | EXPIRED   | Expired                  |
//! | Pending/Active    | CANCELLED | Cancelled                |
//! | Pending           | ACTIVE    | Active                   |
//! | Paid              | REFUNDED  | Refunded                 |
//! | any               | unknown   | unchanged, kept verbatim |
//!
//! The same status delivered again is a redelivery. Anything else is
//! rejected, so a settled order never moves back to Pending or Active and
//! an expired or cancelled order never becomes Paid.

use serde::{Deserialize, Serialize};

use super::PaymentStatus;

/// Order status as reported by the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GatewayOrderStatus {
    Active,
    Paid,
    Expired,
    Cancelled,
    Refunded,
    /// A status this service does not know; stored but never acted on.
    Unrecognized(String),
}

impl GatewayOrderStatus {
    /// Parses the gateway's status string, case-insensitively.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => GatewayOrderStatus::Active,
            "PAID" => GatewayOrderStatus::Paid,
            "EXPIRED" => GatewayOrderStatus::Expired,
            "CANCELLED" | "CANCELED" | "TERMINATED" => GatewayOrderStatus::Cancelled,
            "REFUNDED" => GatewayOrderStatus::Refunded,
            _ => GatewayOrderStatus::Unrecognized(raw.to_string()),
        }
    }

    /// Returns the payment status this event asks for, if the status is known.
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        match self {
            GatewayOrderStatus::Active => Some(PaymentStatus::Active),
            GatewayOrderStatus::Paid => Some(PaymentStatus::Paid),
            GatewayOrderStatus::Expired => Some(PaymentStatus::Expired),
            GatewayOrderStatus::Cancelled => Some(PaymentStatus::Cancelled),
            GatewayOrderStatus::Refunded => Some(PaymentStatus::Refunded),
            GatewayOrderStatus::Unrecognized(_) => None,
        }
    }

    /// Returns the gateway's spelling of the status.
    pub fn as_str(&self) -> &str {
        match self {
            GatewayOrderStatus::Active => "ACTIVE",
            GatewayOrderStatus::Paid => "PAID",
            GatewayOrderStatus::Expired => "EXPIRED",
            GatewayOrderStatus::Cancelled => "CANCELLED",
            GatewayOrderStatus::Refunded => "REFUNDED",
            GatewayOrderStatus::Unrecognized(raw) => raw,
        }
    }
}

/// Outcome of applying a gateway event to an order's payment status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// The status moves forward.
    Advance {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// The event repeats the current status.
    Redelivered(PaymentStatus),

    /// The event would move the order backwards or out of a closed state.
    Rejected {
        current: PaymentStatus,
        attempted: PaymentStatus,
    },

    /// The gateway sent a status string this service does not know.
    Unrecognized(String),
}

impl Transition {
    /// Returns true if shipment booking must be attempted after this transition.
    ///
    /// Redelivered PAID events also return true; the dispatcher's waybill
    /// guard turns them into no-ops once a booking exists.
    pub fn requires_shipment(&self) -> bool {
        matches!(
            self,
            Transition::Advance {
                to: PaymentStatus::Paid,
                ..
            } | Transition::Redelivered(PaymentStatus::Paid)
        )
    }

    /// Returns the resulting status when the transition changes it.
    pub fn new_status(&self) -> Option<PaymentStatus> {
        match self {
            Transition::Advance { to, .. } => Some(*to),
            _ => None,
        }
    }
}

/// Pure transition function over an order's payment status.
pub fn next_payment_status(current: PaymentStatus, incoming: &GatewayOrderStatus) -> Transition {
    let Some(target) = incoming.payment_status() else {
        return Transition::Unrecognized(incoming.as_str().to_string());
    };

    if target == current {
        return Transition::Redelivered(current);
    }

    let allowed = match (current, target) {
        (PaymentStatus::Pending, PaymentStatus::Active) => true,
        (
            PaymentStatus::Pending | PaymentStatus::Active,
            PaymentStatus::Paid | PaymentStatus::Expired | PaymentStatus::Cancelled,
        ) => true,
        (PaymentStatus::Paid, PaymentStatus::Refunded) => true,
        _ => false,
    };

    if allowed {
        Transition::Advance {
            from: current,
            to: target,
        }
    } else {
        Transition::Rejected {
            current,
            attempted: target,
        }
    }
}
