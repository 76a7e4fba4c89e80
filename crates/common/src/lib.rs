//! Shared types for the order fulfillment system.

pub mod currency;
pub mod types;

pub use currency::{Currency, CurrencyError, Money, to_major_units, to_minor_units};
pub use types::{InvalidOrderId, OrderId};
