//! Domain layer for order fulfillment.
//!
//! This crate holds the pure parts of the system:
//! - Billing computation (subtotal, discount, tax, shipping, total)
//! - The order aggregate with its payment and shipment statuses
//! - The payment state machine driven by gateway events
//! - The append-only webhook audit record

pub mod billing;
pub mod error;
pub mod order;

pub use billing::{BillingBreakdown, BillingCalculator, BillingPolicy, DiscountTier};
pub use error::{BillingError, ValidationError};
pub use order::{
    CustomerDetails, CustomerId, GatewayOrderStatus, Order, OrderItem, OrderSnapshot,
    PaymentMethod, PaymentStatus, Pincode, PostalAddress, ProductId, ShipmentStatus,
    SnapshotSource, Transition, WebhookEvent, WebhookEventId, next_payment_status,
};
