use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Longest order id the payment gateway accepts.
const MAX_ORDER_ID_LEN: usize = 50;

/// Identifier of an order, shared with the payment gateway.
///
/// Proposed by the intake, echoed back by the gateway, and immutable from
/// then on. Kept as a string because the gateway treats it as opaque text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct OrderId(String);

/// Returned when a string cannot be used as an order id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid order id {value:?}: {reason}")]
pub struct InvalidOrderId {
    pub value: String,
    pub reason: &'static str,
}

impl OrderId {
    /// Creates a fresh order id of the form `order_<32 hex chars>`.
    pub fn generate() -> Self {
        Self(format!("order_{}", Uuid::new_v4().simple()))
    }

    /// Parses an order id received from a client or the gateway.
    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidOrderId> {
        let value = value.into();
        if value.is_empty() {
            return Err(InvalidOrderId {
                value,
                reason: "must not be empty",
            });
        }
        if value.len() > MAX_ORDER_ID_LEN {
            return Err(InvalidOrderId {
                value,
                reason: "longer than 50 characters",
            });
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(InvalidOrderId {
                value,
                reason: "only ASCII letters, digits, '_' and '-' are allowed",
            });
        }
        Ok(Self(value))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OrderId {
    type Error = InvalidOrderId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for OrderId {
    type Error = InvalidOrderId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}
