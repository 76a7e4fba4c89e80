//! Order lookup for the confirmation page.
//!
//! The webhook that settles an order may land after the shopper is
//! redirected back, so reads go through an ordered chain of lookups:
//! the snapshot cache, then the order store, then the payment gateway.
//! The first tier that knows the order wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::{OrderId, to_major_units};
use domain::{
    GatewayOrderStatus, OrderSnapshot, PaymentStatus, ShipmentStatus, SnapshotSource,
};
use order_store::OrderStore;
use tokio::sync::RwLock;

use crate::error::FulfillmentError;
use crate::services::PaymentGateway;

/// Short-lived, in-process cache of order snapshots.
///
/// Written by the intake and invalidated when a webhook changes an order.
/// Entries expire after the TTL. Never authoritative.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    entries: Arc<RwLock<HashMap<OrderId, (OrderSnapshot, Instant)>>>,
    ttl: Duration,
}

impl SnapshotCache {
    /// Creates an empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Returns the cached snapshot if it has not expired.
    pub async fn get(&self, id: &OrderId) -> Option<OrderSnapshot> {
        {
            let entries = self.entries.read().await;
            match entries.get(id) {
                Some((snapshot, stored_at)) if stored_at.elapsed() < self.ttl => {
                    return Some(snapshot.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().await.remove(id);
        None
    }

    /// Caches a snapshot, replacing any previous entry for the order.
    pub async fn put(&self, snapshot: OrderSnapshot) {
        let id = snapshot.order_id.clone();
        let snapshot = OrderSnapshot {
            source: SnapshotSource::Cache,
            ..snapshot
        };
        self.entries
            .write()
            .await
            .insert(id, (snapshot, Instant::now()));
    }

    /// Drops the entry for an order.
    pub async fn invalidate(&self, id: &OrderId) {
        self.entries.write().await.remove(id);
    }

    /// Returns the number of entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// One tier of the reconciliation chain.
#[async_trait]
pub trait OrderLookup: Send + Sync {
    /// The tier this lookup reads from.
    fn tier(&self) -> SnapshotSource;

    /// Returns the order if this tier knows it.
    async fn lookup(&self, id: &OrderId) -> Result<Option<OrderSnapshot>, FulfillmentError>;
}

/// Reads from the [`SnapshotCache`].
pub struct CacheLookup {
    cache: SnapshotCache,
}

impl CacheLookup {
    pub fn new(cache: SnapshotCache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl OrderLookup for CacheLookup {
    fn tier(&self) -> SnapshotSource {
        SnapshotSource::Cache
    }

    async fn lookup(&self, id: &OrderId) -> Result<Option<OrderSnapshot>, FulfillmentError> {
        Ok(self.cache.get(id).await)
    }
}

/// Reads from the order store.
pub struct StoreLookup<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> StoreLookup<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: OrderStore> OrderLookup for StoreLookup<S> {
    fn tier(&self) -> SnapshotSource {
        SnapshotSource::Store
    }

    async fn lookup(&self, id: &OrderId) -> Result<Option<OrderSnapshot>, FulfillmentError> {
        let order = self.store.get_order(id).await?;
        Ok(order.map(|order| order.snapshot(SnapshotSource::Store)))
    }
}

/// Asks the payment gateway directly.
///
/// The gateway does not echo the cart, so snapshots from this tier have no
/// items and no billing breakdown. Amounts come back in minor units and
/// are converted here.
pub struct GatewayLookup<G: PaymentGateway> {
    gateway: G,
}

impl<G: PaymentGateway> GatewayLookup<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl<G: PaymentGateway> OrderLookup for GatewayLookup<G> {
    fn tier(&self) -> SnapshotSource {
        SnapshotSource::Gateway
    }

    async fn lookup(&self, id: &OrderId) -> Result<Option<OrderSnapshot>, FulfillmentError> {
        let Some(remote) = self.gateway.fetch_order(id).await? else {
            return Ok(None);
        };

        let payment_status = GatewayOrderStatus::parse(&remote.order_status)
            .payment_status()
            .unwrap_or(PaymentStatus::Pending);

        Ok(Some(OrderSnapshot {
            order_id: id.clone(),
            payment_status,
            shipment_status: ShipmentStatus::Unshipped,
            waybill: None,
            gateway_status: Some(remote.order_status),
            items: Vec::new(),
            billing: None,
            total: to_major_units(remote.amount_minor),
            currency: remote.currency,
            customer_name: remote.customer_name,
            customer_email: remote.customer_email,
            source: SnapshotSource::Gateway,
            created_at: None,
        }))
    }
}

/// Ordered chain of lookups. The first tier with a result wins; no tier is
/// asked twice within one call.
pub struct ReconciliationResolver {
    tiers: Vec<Box<dyn OrderLookup>>,
}

impl ReconciliationResolver {
    /// Creates a resolver over the given tiers, tried in order.
    pub fn new(tiers: Vec<Box<dyn OrderLookup>>) -> Self {
        Self { tiers }
    }

    /// Creates the cache, store, gateway chain.
    pub fn standard<S, G>(cache: SnapshotCache, store: S, gateway: G) -> Self
    where
        S: OrderStore + 'static,
        G: PaymentGateway + 'static,
    {
        Self::new(vec![
            Box::new(CacheLookup::new(cache)),
            Box::new(StoreLookup::new(store)),
            Box::new(GatewayLookup::new(gateway)),
        ])
    }

    /// Resolves an order to a snapshot tagged with the tier it came from.
    ///
    /// A failing tier counts as a miss. If every tier misses and one of them
    /// failed, the last failure is returned instead of `NotFound`.
    #[tracing::instrument(skip(self), fields(order_id = %id))]
    pub async fn resolve(&self, id: &OrderId) -> Result<OrderSnapshot, FulfillmentError> {
        let mut last_error = None;

        for tier in &self.tiers {
            match tier.lookup(id).await {
                Ok(Some(snapshot)) => {
                    metrics::counter!("reconciliation_hits_total", "tier" => tier.tier().as_str())
                        .increment(1);
                    tracing::debug!(tier = tier.tier().as_str(), "order resolved");
                    return Ok(snapshot);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        tier = tier.tier().as_str(),
                        error = %e,
                        "reconciliation tier failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        metrics::counter!("reconciliation_misses_total").increment(1);
        Err(last_error.unwrap_or_else(|| FulfillmentError::NotFound(id.clone())))
    }
}

#[cfg(test)]
mod tests {
    use common::{Currency, Money};
    use domain::{BillingCalculator, CustomerDetails, Order, OrderItem, PaymentMethod};
    use order_store::InMemoryOrderStore;

    use super::*;
    use crate::services::{GatewayOrder, InMemoryPaymentGateway};

    fn order() -> Order {
        Order::place(
            OrderId::generate(),
            CustomerDetails {
                name: "Asha Rao".to_string(),
                email: "asha@example.com".to_string(),
                phone: "9876543210".to_string(),
                address: None,
            },
            vec![OrderItem::new("SKU-1", "Widget", 3, Money::from_paise(30_000))],
            PaymentMethod::Prepaid,
            &BillingCalculator::default(),
        )
        .unwrap()
    }

    struct FailingLookup;

    #[async_trait]
    impl OrderLookup for FailingLookup {
        fn tier(&self) -> SnapshotSource {
            SnapshotSource::Store
        }

        async fn lookup(&self, _id: &OrderId) -> Result<Option<OrderSnapshot>, FulfillmentError> {
            Err(FulfillmentError::upstream("order_store", "connection refused"))
        }
    }

    #[tokio::test]
    async fn test_cache_entries_expire() {
        let cache = SnapshotCache::new(Duration::from_millis(20));
        let order = order();
        cache.put(order.snapshot(SnapshotSource::Store)).await;

        let hit = cache.get(&order.id).await.unwrap();
        assert_eq!(hit.source, SnapshotSource::Cache);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get(&order.id).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_cache_invalidate() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let order = order();
        cache.put(order.snapshot(SnapshotSource::Store)).await;
        cache.invalidate(&order.id).await;
        assert!(cache.get(&order.id).await.is_none());
    }

    #[tokio::test]
    async fn test_first_tier_wins_and_later_tiers_are_not_asked() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let store = InMemoryOrderStore::new();
        let gateway = InMemoryPaymentGateway::new();
        let order = order();
        store.insert_order(&order).await.unwrap();
        cache.put(order.snapshot(SnapshotSource::Store)).await;

        let resolver = ReconciliationResolver::standard(cache, store, gateway.clone());
        let snapshot = resolver.resolve(&order.id).await.unwrap();

        assert_eq!(snapshot.source, SnapshotSource::Cache);
        assert_eq!(gateway.fetch_calls().await, 0);
    }

    #[tokio::test]
    async fn test_gateway_tier_converts_minor_units() {
        let gateway = InMemoryPaymentGateway::new();
        let id = OrderId::generate();
        gateway
            .insert_order(GatewayOrder {
                order_id: id.to_string(),
                order_status: "PAID".to_string(),
                amount_minor: 121_200,
                currency: Currency::Inr,
                customer_name: Some("Asha Rao".to_string()),
                customer_email: None,
            })
            .await;

        let resolver = ReconciliationResolver::standard(
            SnapshotCache::new(Duration::from_secs(60)),
            InMemoryOrderStore::new(),
            gateway,
        );
        let snapshot = resolver.resolve(&id).await.unwrap();

        assert_eq!(snapshot.source, SnapshotSource::Gateway);
        assert_eq!(snapshot.payment_status, PaymentStatus::Paid);
        assert_eq!(snapshot.total, Money::from_paise(121_200).major());
        assert!(snapshot.items.is_empty());
        assert!(snapshot.billing.is_none());
    }

    #[tokio::test]
    async fn test_unknown_everywhere_is_not_found() {
        let resolver = ReconciliationResolver::standard(
            SnapshotCache::new(Duration::from_secs(60)),
            InMemoryOrderStore::new(),
            InMemoryPaymentGateway::new(),
        );
        let result = resolver.resolve(&OrderId::generate()).await;
        assert!(matches!(result, Err(FulfillmentError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failing_tier_is_a_miss() {
        let gateway = InMemoryPaymentGateway::new();
        let id = OrderId::generate();
        gateway
            .insert_order(GatewayOrder {
                order_id: id.to_string(),
                order_status: "ACTIVE".to_string(),
                amount_minor: 50_000,
                currency: Currency::Inr,
                customer_name: None,
                customer_email: None,
            })
            .await;

        let resolver = ReconciliationResolver::new(vec![
            Box::new(FailingLookup),
            Box::new(GatewayLookup::new(gateway)),
        ]);
        let snapshot = resolver.resolve(&id).await.unwrap();
        assert_eq!(snapshot.payment_status, PaymentStatus::Active);

        let resolver = ReconciliationResolver::new(vec![Box::new(FailingLookup)]);
        let result = resolver.resolve(&id).await;
        assert!(matches!(result, Err(FulfillmentError::Upstream { .. })));
    }
}
