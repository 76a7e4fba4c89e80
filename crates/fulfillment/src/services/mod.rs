//! External collaborators: the payment gateway and the logistics carrier.

pub mod carrier;
pub mod gateway;

pub use carrier::{
    Carrier, CarrierConfig, CarrierPaymentMode, DelhiveryCarrier, InMemoryCarrier, PincodeInfo,
    ShipmentBooking, ShipmentRequest,
};
pub use gateway::{
    GatewayConfig, GatewayOrder, GatewaySession, HttpPaymentGateway, InMemoryPaymentGateway,
    PaymentGateway, SessionRequest,
};
