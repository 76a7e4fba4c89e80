//! Order aggregate and its client-facing snapshot.

use chrono::{DateTime, Utc};
use common::{Currency, OrderId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::billing::{BillingBreakdown, BillingCalculator};
use crate::error::ValidationError;

use super::{
    CustomerDetails, CustomerId, OrderItem, PaymentMethod, PaymentStatus, ShipmentStatus,
};

/// Order aggregate root.
///
/// Items and billing are fixed when the order is placed. Afterwards only the
/// payment and shipment fields change, and only through the order store's
/// conditional updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Gateway-echoed identifier.
    pub id: OrderId,

    /// Stable identifier derived from the customer's email and phone.
    pub customer_id: CustomerId,

    /// Contact details and shipping address.
    pub customer: CustomerDetails,

    /// Line items, in cart order.
    pub items: Vec<OrderItem>,

    /// Amounts the gateway was told about.
    pub billing: BillingBreakdown,

    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub shipment_status: ShipmentStatus,

    /// Carrier tracking id; set at most once.
    pub waybill: Option<String>,

    /// Reason of the last failed booking attempt.
    pub shipment_error: Option<String>,

    /// Last status string received from the gateway, verbatim.
    pub gateway_status: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Validates the checkout input, computes billing, and returns a new
    /// order in `Pending`.
    pub fn place(
        id: OrderId,
        customer: CustomerDetails,
        items: Vec<OrderItem>,
        payment_method: PaymentMethod,
        calculator: &BillingCalculator,
    ) -> Result<Self, ValidationError> {
        customer.validate()?;
        let billing = calculator.compute(&items)?;
        let now = Utc::now();

        Ok(Self {
            id,
            customer_id: customer.customer_id(),
            customer,
            items,
            billing,
            payment_method,
            payment_status: PaymentStatus::Pending,
            shipment_status: ShipmentStatus::Unshipped,
            waybill: None,
            shipment_error: None,
            gateway_status: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns the total quantity over all line items.
    pub fn total_item_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Returns true once a shipment has been booked.
    pub fn has_waybill(&self) -> bool {
        self.waybill.as_deref().is_some_and(|w| !w.is_empty())
    }

    /// Returns a one-line description of the items for a carrier label.
    pub fn products_description(&self) -> String {
        self.items
            .iter()
            .map(|item| format!("{} x{}", item.name, item.quantity))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Builds a snapshot of this order tagged with where it was read from.
    pub fn snapshot(&self, source: SnapshotSource) -> OrderSnapshot {
        OrderSnapshot {
            order_id: self.id.clone(),
            payment_status: self.payment_status,
            shipment_status: self.shipment_status,
            waybill: self.waybill.clone(),
            gateway_status: self.gateway_status.clone(),
            items: self.items.clone(),
            billing: Some(self.billing),
            total: self.billing.total.major(),
            currency: self.billing.currency,
            customer_name: Some(self.customer.name.clone()),
            customer_email: Some(self.customer.email.clone()),
            source,
            created_at: Some(self.created_at),
        }
    }
}

/// The data source a snapshot was read from, least authoritative first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Cache,
    Store,
    Gateway,
}

impl SnapshotSource {
    /// Returns the metric label for this tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotSource::Cache => "cache",
            SnapshotSource::Store => "store",
            SnapshotSource::Gateway => "gateway",
        }
    }
}

/// Denormalized, possibly stale view of an order used for display.
///
/// Snapshots are never written back. One built from the gateway has no
/// items and no billing breakdown, only the total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub order_id: OrderId,
    pub payment_status: PaymentStatus,
    pub shipment_status: ShipmentStatus,
    pub waybill: Option<String>,
    /// Last raw status seen from the gateway.
    pub gateway_status: Option<String>,
    pub items: Vec<OrderItem>,
    pub billing: Option<BillingBreakdown>,
    /// Total in major units.
    pub total: Decimal,
    pub currency: Currency,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub source: SnapshotSource,
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use common::Money;

    use super::*;
    use crate::error::BillingError;

    fn customer() -> CustomerDetails {
        CustomerDetails {
            name: "Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
            phone: "9876543210".to_string(),
            address: None,
        }
    }

    fn place(items: Vec<OrderItem>) -> Result<Order, ValidationError> {
        Order::place(
            OrderId::generate(),
            customer(),
            items,
            PaymentMethod::Prepaid,
            &BillingCalculator::default(),
        )
    }

    #[test]
    fn test_place_starts_pending_and_unshipped() {
        let order = place(vec![OrderItem::new(
            "SKU-1",
            "Widget",
            3,
            Money::from_paise(30_000),
        )])
        .unwrap();

        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.shipment_status, ShipmentStatus::Unshipped);
        assert!(!order.has_waybill());
        assert_eq!(order.billing.total.paise(), 121_200);
        assert_eq!(order.customer_id, customer().customer_id());
        assert_eq!(order.created_at, order.updated_at);
    }

    #[test]
    fn test_place_rejects_bad_input() {
        let mut c = customer();
        c.phone = String::new();
        let result = Order::place(
            OrderId::generate(),
            c,
            vec![OrderItem::new("SKU-1", "Widget", 1, Money::from_paise(100))],
            PaymentMethod::Prepaid,
            &BillingCalculator::default(),
        );
        assert_eq!(
            result,
            Err(ValidationError::MissingField { field: "phone" })
        );

        assert_eq!(
            place(vec![]),
            Err(ValidationError::Billing(BillingError::NoItems))
        );
    }

    #[test]
    fn test_item_count_and_description() {
        let order = place(vec![
            OrderItem::new("SKU-1", "Kurta", 2, Money::from_paise(50_000)),
            OrderItem::new("SKU-2", "Dupatta", 1, Money::from_paise(20_000)),
        ])
        .unwrap();

        assert_eq!(order.total_item_count(), 3);
        assert_eq!(order.products_description(), "Kurta x2, Dupatta x1");
    }

    #[test]
    fn test_item_count_does_not_overflow() {
        let order = place(vec![
            OrderItem::new("SKU-1", "Bead", 3_000_000_000, Money::from_paise(1)),
            OrderItem::new("SKU-2", "Sequin", 3_000_000_000, Money::from_paise(1)),
        ])
        .unwrap();

        assert_eq!(order.total_item_count(), 6_000_000_000);
    }

    #[test]
    fn test_snapshot_carries_billing() {
        let order = place(vec![OrderItem::new(
            "SKU-1",
            "Widget",
            1,
            Money::from_paise(250_000),
        )])
        .unwrap();

        let snapshot = order.snapshot(SnapshotSource::Store);
        assert_eq!(snapshot.order_id, order.id);
        assert_eq!(snapshot.source, SnapshotSource::Store);
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.billing, Some(order.billing));
        assert_eq!(snapshot.total, order.billing.total.major());
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let order = place(vec![OrderItem::new(
            "SKU-1",
            "Widget",
            1,
            Money::from_paise(10_000),
        )])
        .unwrap();
        let json = serde_json::to_value(order.snapshot(SnapshotSource::Cache)).unwrap();
        assert_eq!(json["paymentStatus"], "PENDING");
        assert_eq!(json["shipmentStatus"], "UNSHIPPED");
        assert_eq!(json["source"], "cache");
    }
}
