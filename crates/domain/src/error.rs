//! Domain error types.

use common::CurrencyError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Rejected customer or cart input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required customer field is blank.
    #[error("Customer {field} is required")]
    MissingField { field: &'static str },

    /// The email address is not plausible.
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    /// The phone number does not have 10 to 15 digits.
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    /// The postal code is not a six digit pincode.
    #[error("Invalid pincode: {0}")]
    InvalidPincode(String),

    /// The amount the client displayed differs from the computed total.
    #[error("Amount mismatch: client sent {claimed}, computed total is {computed}")]
    AmountMismatch { claimed: Decimal, computed: Decimal },

    /// The billing input was rejected.
    #[error(transparent)]
    Billing(#[from] BillingError),
}

/// Errors from the billing calculator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    /// The cart is empty.
    #[error("Order has no items")]
    NoItems,

    /// A line item has a zero quantity.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: String, quantity: u32 },

    /// A line item has a zero or negative price.
    #[error("Invalid price for {product_id}: {price_paise} paise (must be greater than 0)")]
    InvalidPrice {
        product_id: String,
        price_paise: i64,
    },

    /// An amount overflowed the currency boundary.
    #[error("Amount out of range: {0}")]
    Currency(#[from] CurrencyError),
}
