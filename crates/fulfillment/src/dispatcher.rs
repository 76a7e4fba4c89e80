//! Shipment booking for paid orders.

use std::time::Duration;

use common::OrderId;
use domain::{Order, PaymentMethod, PostalAddress};
use order_store::{OrderStore, ShipmentClaim};
use rust_decimal::Decimal;

use crate::error::FulfillmentError;
use crate::services::{Carrier, CarrierPaymentMode, ShipmentRequest};

/// Default time allowed for one carrier booking call.
pub const DEFAULT_BOOKING_TIMEOUT: Duration = Duration::from_secs(10);

/// Default shipment claim lease. Longer than any booking call.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(300);

/// Time a claim must outlive the carrier timeout, to cover the store writes
/// around the call.
pub const MIN_LEASE_MARGIN: Duration = Duration::from_secs(30);

const MISSING_ADDRESS: &str = "missing shipping address";

/// Result of a dispatch attempt. Dispatch never fails; failures are
/// recorded on the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The order already has a waybill. No carrier call was made.
    AlreadyBooked,
    /// Another attempt holds the booking claim. No carrier call was made.
    ClaimHeld,
    /// The carrier accepted the shipment.
    Booked { waybill: String },
    /// The booking failed and the order is marked `Failed`.
    Failed { reason: String },
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::AlreadyBooked => "already_booked",
            DispatchOutcome::ClaimHeld => "claim_held",
            DispatchOutcome::Booked { .. } => "booked",
            DispatchOutcome::Failed { .. } => "failed",
        }
    }
}

/// Books carrier shipments for paid orders, at most once per order.
///
/// The waybill check is a fast path. The store's shipment claim is what
/// keeps concurrent deliveries, across processes, from booking twice.
pub struct ShipmentDispatcher<S: OrderStore, C: Carrier> {
    store: S,
    carrier: C,
    timeout: Duration,
    lease: Duration,
}

impl<S: OrderStore, C: Carrier> ShipmentDispatcher<S, C> {
    /// Creates a dispatcher with the default timeout and claim lease.
    pub fn new(store: S, carrier: C) -> Self {
        Self {
            store,
            carrier,
            timeout: DEFAULT_BOOKING_TIMEOUT,
            lease: DEFAULT_CLAIM_LEASE,
        }
    }

    /// Sets the carrier call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the claim lease.
    ///
    /// The lease in effect is never shorter than the carrier timeout plus
    /// [`MIN_LEASE_MARGIN`], so a claim cannot expire while its booking call
    /// is still in flight.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Returns the claim lease in effect.
    pub fn lease(&self) -> Duration {
        self.lease.max(self.timeout.saturating_add(MIN_LEASE_MARGIN))
    }

    /// Books a shipment for `order` unless one exists or is in flight.
    ///
    /// `fallback_address` is used when the order has no address of its own,
    /// typically the shipping address from the payment webhook.
    #[tracing::instrument(skip(self, order, fallback_address), fields(order_id = %order.id))]
    pub async fn dispatch(
        &self,
        order: &Order,
        fallback_address: Option<&PostalAddress>,
    ) -> DispatchOutcome {
        if order.has_waybill() {
            metrics::counter!("shipment_booking_skipped_total", "reason" => "already_booked")
                .increment(1);
            tracing::debug!("waybill already assigned, skipping booking");
            return DispatchOutcome::AlreadyBooked;
        }

        let claim = match self.store.claim_shipment(&order.id, self.lease()).await {
            Ok(Some(claim)) => claim,
            Ok(None) => {
                metrics::counter!("shipment_booking_skipped_total", "reason" => "claim_held")
                    .increment(1);
                tracing::debug!("shipment already booked or being booked");
                return DispatchOutcome::ClaimHeld;
            }
            Err(e) => {
                // Without a claim nothing can be recorded on the order.
                metrics::counter!("shipments_failed_total").increment(1);
                tracing::error!(order_id = %order.id, error = %e, "failed to claim shipment");
                return DispatchOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let Some(address) = order.customer.address.as_ref().or(fallback_address) else {
            return self.fail(&order.id, &claim, MISSING_ADDRESS).await;
        };

        let request = shipment_request(order, address);
        let booking = self.carrier.create_shipment(&request);
        let result = match tokio::time::timeout(self.timeout, booking).await {
            Ok(result) => result,
            Err(_) => Err(FulfillmentError::Timeout {
                service: "carrier",
                after: self.timeout,
            }),
        };

        match result {
            Ok(booking) if !booking.waybill.trim().is_empty() => {
                self.book(&order.id, &claim, booking.waybill).await
            }
            Ok(_) => self.fail(&order.id, &claim, "carrier returned an empty waybill").await,
            Err(e) => self.fail(&order.id, &claim, &e.to_string()).await,
        }
    }

    async fn book(&self, id: &OrderId, claim: &ShipmentClaim, waybill: String) -> DispatchOutcome {
        match self.store.record_waybill(id, claim, &waybill).await {
            Ok(true) => {
                metrics::counter!("shipments_booked_total").increment(1);
                tracing::info!(order_id = %id, waybill = %waybill, "shipment booked");
                DispatchOutcome::Booked { waybill }
            }
            Ok(false) => {
                // The claim expired while the carrier was answering.
                metrics::counter!("shipments_failed_total").increment(1);
                tracing::error!(
                    order_id = %id,
                    waybill = %waybill,
                    "claim lost before the waybill was recorded; booking needs manual review"
                );
                DispatchOutcome::Failed {
                    reason: format!("claim lost before waybill {waybill} was recorded"),
                }
            }
            Err(e) => {
                metrics::counter!("shipments_failed_total").increment(1);
                tracing::error!(
                    order_id = %id,
                    waybill = %waybill,
                    error = %e,
                    "failed to record waybill"
                );
                DispatchOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn fail(&self, id: &OrderId, claim: &ShipmentClaim, reason: &str) -> DispatchOutcome {
        metrics::counter!("shipments_failed_total").increment(1);
        tracing::error!(order_id = %id, reason, "shipment booking failed");

        if let Err(e) = self.store.record_shipment_failure(id, claim, reason).await {
            tracing::error!(order_id = %id, error = %e, "failed to record shipment failure");
        }

        DispatchOutcome::Failed {
            reason: reason.to_string(),
        }
    }
}

/// Estimated parcel weight: half a kilo per item, never below half a kilo.
pub fn estimated_weight_kg(item_count: u64) -> Decimal {
    let half = Decimal::new(5, 1);
    (half * Decimal::from(item_count)).max(half)
}

fn shipment_request(order: &Order, address: &PostalAddress) -> ShipmentRequest {
    let total = order.billing.total.major();
    let (payment_mode, cod_amount) = match order.payment_method {
        PaymentMethod::Cod => (CarrierPaymentMode::Cod, Some(total)),
        PaymentMethod::Prepaid => (CarrierPaymentMode::Prepaid, None),
    };

    ShipmentRequest {
        consignee_name: order.customer.name.clone(),
        address: address.street(),
        phone: order.customer.phone.clone(),
        pincode: address.pincode.clone(),
        city: address.city.clone(),
        state: address.state.clone(),
        country: address.country.clone(),
        order_ref: order.id.to_string(),
        payment_mode,
        products_desc: order.products_description(),
        cod_amount,
        total_amount: total,
        weight_kg: estimated_weight_kg(order.total_item_count()),
    }
}
