//! Order fulfillment services.
//!
//! This crate wires the domain to the outside world:
//! - [`OrderIntake`] prices a cart, stores the order, and opens a payment session
//! - [`WebhookIngress`] verifies gateway webhooks and drives the payment state machine
//! - [`ShipmentDispatcher`] books a carrier shipment once per paid order
//! - [`PincodeServiceabilityChecker`] answers "can you deliver here?"
//! - [`ReconciliationResolver`] finds an order in the cache, the store, or the gateway
//!
//! Collaborators are passed in at construction; there is no global state.

pub mod dispatcher;
pub mod error;
pub mod intake;
pub mod reconciliation;
pub mod serviceability;
pub mod services;
pub mod signature;
pub mod webhook;

pub use dispatcher::{DispatchOutcome, ShipmentDispatcher, estimated_weight_kg};
pub use error::{FulfillmentError, SignatureError};
pub use intake::{CreateOrderRequest, IntakeReceipt, OrderIntake};
pub use reconciliation::{
    CacheLookup, GatewayLookup, OrderLookup, ReconciliationResolver, SnapshotCache, StoreLookup,
};
pub use serviceability::{
    DeliveryEstimate, PincodeServiceabilityChecker, ServiceabilityQuery, ServiceabilityResult,
    UnserviceableReason,
};
pub use signature::SignatureVerifier;
pub use webhook::{WebhookIngress, WebhookOutcome, WebhookPayload};
