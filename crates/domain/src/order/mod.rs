//! Order aggregate and related types.

mod aggregate;
mod state;
mod transition;
mod value_objects;
mod webhook_event;

pub use aggregate::{Order, OrderSnapshot, SnapshotSource};
pub use state::{PaymentStatus, ShipmentStatus};
pub use transition::{GatewayOrderStatus, Transition, next_payment_status};
pub use value_objects::{
    CustomerDetails, CustomerId, OrderItem, PaymentMethod, Pincode, PostalAddress, ProductId,
};
pub use webhook_event::{WebhookEvent, WebhookEventId};
