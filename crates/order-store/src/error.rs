use common::OrderId;
use thiserror::Error;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An order with this id already exists.
    #[error("Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The order was not found.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// A stored row could not be mapped back to a domain value.
    #[error("Corrupt row for order {order_id}: {reason}")]
    Corrupt { order_id: String, reason: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
