//! Fulfillment error types.

use std::time::Duration;

use common::{CurrencyError, OrderId};
use domain::ValidationError;
use order_store::StoreError;
use thiserror::Error;

/// Why a webhook delivery failed authentication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Missing signature header")]
    MissingSignature,

    #[error("Missing timestamp header")]
    MissingTimestamp,

    #[error("Timestamp is not a unix time: {0}")]
    InvalidTimestamp(String),

    /// The timestamp is outside the replay window.
    #[error("Timestamp is {skew_secs}s away from now, tolerance is {tolerance_secs}s")]
    Stale { skew_secs: i64, tolerance_secs: u64 },

    #[error("Signature does not match")]
    Mismatch,
}

/// Errors that can occur while fulfilling orders.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Bad or missing customer or cart input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A verified request whose body cannot be understood.
    #[error("Malformed request: {0}")]
    Malformed(String),

    /// Missing or invalid webhook credentials.
    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    /// The payment gateway or carrier failed or returned something unusable.
    #[error("{service} error: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    /// An upstream call did not finish in time.
    #[error("{service} timed out after {after:?}")]
    Timeout {
        service: &'static str,
        after: Duration,
    },

    /// The record already exists.
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// The same change was already applied.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Concurrent writers kept moving the order while this one retried.
    #[error("Order {0} kept changing while a webhook was applied")]
    Contention(OrderId),

    /// No tier knows the order.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// Order store error.
    #[error("Order store error: {0}")]
    Store(StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FulfillmentError {
    pub(crate) fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        FulfillmentError::Upstream {
            service,
            message: message.into(),
        }
    }

    /// Returns true if the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FulfillmentError::Upstream { .. }
                | FulfillmentError::Timeout { .. }
                | FulfillmentError::Contention(_)
                | FulfillmentError::Store(_)
        )
    }
}

impl From<StoreError> for FulfillmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateOrder(id) => FulfillmentError::Duplicate(format!("order {id}")),
            StoreError::NotFound(id) => FulfillmentError::NotFound(id),
            other => FulfillmentError::Store(other),
        }
    }
}

impl From<CurrencyError> for FulfillmentError {
    fn from(err: CurrencyError) -> Self {
        FulfillmentError::Validation(ValidationError::Billing(err.into()))
    }
}
