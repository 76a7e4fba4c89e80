//! Persistent order store.
//!
//! The store is the single source of truth for orders. Every state change
//! goes through a conditional update, so concurrent webhook deliveries on
//! one or many service instances cannot both win:
//!
//! - payment transitions compare the expected current status,
//! - shipment booking first claims the order (`waybill IS NULL` plus a lease),
//! - the waybill is written only by the holder of the claim.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use store::{OrderStore, OrderStoreExt, ShipmentClaim};
