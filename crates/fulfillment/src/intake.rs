//! Order intake: billing, persistence, and the payment gateway session.

use std::time::Instant;

use common::{OrderId, to_minor_units};
use domain::{
    BillingCalculator, CustomerDetails, Order, OrderItem, PaymentMethod, PaymentStatus,
    SnapshotSource, ValidationError,
};
use order_store::OrderStore;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::FulfillmentError;
use crate::reconciliation::SnapshotCache;
use crate::services::{PaymentGateway, SessionRequest};

const SERVICE: &str = "payment_gateway";

/// Placeholder in a return target that is replaced with the order id.
pub const ORDER_ID_PLACEHOLDER: &str = "{order_id}";

/// Checkout input.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub customer: CustomerDetails,
    pub items: Vec<OrderItem>,
    pub payment_method: PaymentMethod,
    /// Where the gateway sends the shopper afterwards.
    pub return_target: String,
    /// Total the client displayed, in major units. Checked against the
    /// computed total when present.
    pub amount_major: Option<Decimal>,
}

/// Handle returned to the shopper after a successful intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeReceipt {
    pub order_id: OrderId,
    pub gateway_session_token: String,
    pub amount_minor_units: i64,
}

/// Creates orders and opens their payment sessions.
///
/// Either the order row and the gateway session both exist afterwards, or
/// the row is removed again.
pub struct OrderIntake<S: OrderStore, G: PaymentGateway> {
    store: S,
    gateway: G,
    calculator: BillingCalculator,
    cache: SnapshotCache,
}

impl<S: OrderStore, G: PaymentGateway> OrderIntake<S, G> {
    pub fn new(store: S, gateway: G, calculator: BillingCalculator, cache: SnapshotCache) -> Self {
        Self {
            store,
            gateway,
            calculator,
            cache,
        }
    }

    /// Validates the cart, stores a pending order, and opens a gateway session.
    #[tracing::instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<IntakeReceipt, FulfillmentError> {
        let start = Instant::now();
        let result = self.create_order_inner(request).await;

        metrics::histogram!("order_intake_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        match &result {
            Ok(receipt) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_id = %receipt.order_id,
                    amount_minor_units = receipt.amount_minor_units,
                    "order created"
                );
            }
            Err(e) => {
                metrics::counter!("order_intake_failures_total").increment(1);
                tracing::warn!(error = %e, "order intake failed");
            }
        }
        result
    }

    async fn create_order_inner(
        &self,
        request: CreateOrderRequest,
    ) -> Result<IntakeReceipt, FulfillmentError> {
        let mut order = Order::place(
            OrderId::generate(),
            request.customer,
            request.items,
            request.payment_method,
            &self.calculator,
        )?;

        let computed = order.billing.total.major();
        if let Some(claimed) = request.amount_major
            && claimed != computed
        {
            return Err(ValidationError::AmountMismatch { claimed, computed }.into());
        }
        let amount_minor = to_minor_units(computed)?;

        self.store.insert_order(&order).await?;

        let session_request = SessionRequest {
            order_id: order.id.clone(),
            amount_minor,
            currency: order.billing.currency,
            customer_id: order.customer_id.clone(),
            customer: order.customer.clone(),
            return_url: request
                .return_target
                .replace(ORDER_ID_PLACEHOLDER, order.id.as_str()),
        };

        let session = match self.gateway.create_session(&session_request).await {
            Ok(session) => session,
            Err(e) => {
                self.compensate(&order.id).await;
                return Err(e);
            }
        };

        if session.order_id != order.id.as_str() || session.amount_minor != amount_minor {
            self.compensate(&order.id).await;
            return Err(FulfillmentError::upstream(
                SERVICE,
                format!(
                    "session echoed order {} for {} minor units, expected {} for {}",
                    session.order_id, session.amount_minor, order.id, amount_minor
                ),
            ));
        }

        let activated = match self
            .store
            .update_payment_status(
                &order.id,
                PaymentStatus::Pending,
                PaymentStatus::Active,
                "ACTIVE",
            )
            .await
        {
            Ok(activated) => activated,
            Err(e) => {
                self.compensate(&order.id).await;
                return Err(e.into());
            }
        };

        if activated {
            order.payment_status = PaymentStatus::Active;
            order.gateway_status = Some("ACTIVE".to_string());
            self.cache.put(order.snapshot(SnapshotSource::Store)).await;
        } else {
            // A webhook moved the order on first; the store has the newer state.
            tracing::debug!(order_id = %order.id, "order advanced before activation");
        }

        Ok(IntakeReceipt {
            order_id: order.id,
            gateway_session_token: session.session_token,
            amount_minor_units: amount_minor,
        })
    }

    async fn compensate(&self, id: &OrderId) {
        match self.store.delete_order(id).await {
            Ok(_) => tracing::info!(order_id = %id, "removed order after failed intake"),
            Err(e) => tracing::error!(
                order_id = %id,
                error = %e,
                "failed to remove order after failed intake"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use common::Money;
    use order_store::{InMemoryOrderStore, OrderStoreExt};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::reconciliation::ReconciliationResolver;
    use crate::services::{GatewayOrder, GatewaySession, InMemoryPaymentGateway};

    struct Fixture {
        store: InMemoryOrderStore,
        gateway: InMemoryPaymentGateway,
        cache: SnapshotCache,
        intake: OrderIntake<InMemoryOrderStore, InMemoryPaymentGateway>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryOrderStore::new();
        let gateway = InMemoryPaymentGateway::new();
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let intake = OrderIntake::new(
            store.clone(),
            gateway.clone(),
            BillingCalculator::default(),
            cache.clone(),
        );
        Fixture {
            store,
            gateway,
            cache,
            intake,
        }
    }

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            customer: CustomerDetails {
                name: "Asha Rao".to_string(),
                email: "asha@example.com".to_string(),
                phone: "9876543210".to_string(),
                address: None,
            },
            items: vec![OrderItem::new("SKU-1", "Widget", 3, Money::from_paise(30_000))],
            payment_method: PaymentMethod::Prepaid,
            return_target: "https://shop.example.com/orders/{order_id}".to_string(),
            amount_major: None,
        }
    }

    #[tokio::test]
    async fn test_creates_active_order() {
        let f = fixture();
        let receipt = f.intake.create_order(request()).await.unwrap();

        assert_eq!(receipt.amount_minor_units, 121_200);
        assert_eq!(receipt.gateway_session_token, "session_0001");

        let order = f.store.require_order(&receipt.order_id).await.unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Active);
        assert_eq!(order.billing.total.paise(), receipt.amount_minor_units);

        let cached = f.cache.get(&receipt.order_id).await.unwrap();
        assert_eq!(cached.source, SnapshotSource::Cache);
        assert_eq!(cached.payment_status, PaymentStatus::Active);
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_call() {
        let f = fixture();
        let mut req = request();
        req.customer.email = String::new();

        let result = f.intake.create_order(req).await;
        assert!(matches!(result, Err(FulfillmentError::Validation(_))));
        assert_eq!(f.gateway.session_calls().await, 0);
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_rejected() {
        let f = fixture();
        let mut req = request();
        req.amount_major = Some(dec!(900));

        let result = f.intake.create_order(req).await;
        assert!(matches!(
            result,
            Err(FulfillmentError::Validation(
                ValidationError::AmountMismatch { .. }
            ))
        ));

        let mut req = request();
        req.amount_major = Some(dec!(1212.00));
        assert!(f.intake.create_order(req).await.is_ok());
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_no_order() {
        let f = fixture();
        f.gateway.set_fail_on_create(true).await;

        let result = f.intake.create_order(request()).await;
        assert!(matches!(result, Err(FulfillmentError::Upstream { .. })));
        assert_eq!(f.store.order_count().await, 0);
        assert!(f.cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_mismatched_echo_leaves_no_order() {
        let f = fixture();
        f.gateway
            .set_echo_override(Some("order_someone_else".to_string()))
            .await;

        let result = f.intake.create_order(request()).await;
        assert!(matches!(result, Err(FulfillmentError::Upstream { .. })));
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_makes_no_gateway_call() {
        let f = fixture();
        f.store.set_fail_on_insert(true).await;

        let result = f.intake.create_order(request()).await;
        assert!(matches!(result, Err(FulfillmentError::Store(_))));
        assert_eq!(f.gateway.session_calls().await, 0);
    }

    #[tokio::test]
    async fn test_activation_failure_removes_order() {
        let f = fixture();
        f.store.set_fail_on_payment_update(true).await;

        let result = f.intake.create_order(request()).await;
        assert!(matches!(result, Err(FulfillmentError::Store(_))));
        assert_eq!(f.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_repeat_customer_keeps_identifier() {
        let f = fixture();
        let first = f.intake.create_order(request()).await.unwrap();
        let mut again = request();
        again.customer.email = "ASHA@example.com ".to_string();
        again.customer.phone = "+91 98765 43210".to_string();
        let second = f.intake.create_order(again).await.unwrap();

        let a = f.store.require_order(&first.order_id).await.unwrap();
        let b = f.store.require_order(&second.order_id).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.customer_id, b.customer_id);
    }

    /// Gateway that reports the order paid while the session is being opened.
    #[derive(Clone)]
    struct PaidDuringSessionGateway {
        inner: InMemoryPaymentGateway,
        store: InMemoryOrderStore,
        cache: SnapshotCache,
    }

    #[async_trait::async_trait]
    impl PaymentGateway for PaidDuringSessionGateway {
        async fn create_session(
            &self,
            request: &SessionRequest,
        ) -> Result<GatewaySession, FulfillmentError> {
            let session = self.inner.create_session(request).await?;
            self.store
                .update_payment_status(
                    &request.order_id,
                    PaymentStatus::Pending,
                    PaymentStatus::Paid,
                    "PAID",
                )
                .await?;
            self.cache.invalidate(&request.order_id).await;
            Ok(session)
        }

        async fn fetch_order(
            &self,
            order_id: &OrderId,
        ) -> Result<Option<GatewayOrder>, FulfillmentError> {
            self.inner.fetch_order(order_id).await
        }
    }

    #[tokio::test]
    async fn test_webhook_before_activation_is_not_cached_over() {
        let store = InMemoryOrderStore::new();
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let gateway = PaidDuringSessionGateway {
            inner: InMemoryPaymentGateway::new(),
            store: store.clone(),
            cache: cache.clone(),
        };
        let intake = OrderIntake::new(
            store.clone(),
            gateway.clone(),
            BillingCalculator::default(),
            cache.clone(),
        );

        let receipt = intake.create_order(request()).await.unwrap();

        let order = store.require_order(&receipt.order_id).await.unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert!(cache.get(&receipt.order_id).await.is_none());

        let resolver = ReconciliationResolver::standard(cache, store, gateway);
        let snapshot = resolver.resolve(&receipt.order_id).await.unwrap();
        assert_eq!(snapshot.source, SnapshotSource::Store);
        assert_eq!(snapshot.payment_status, PaymentStatus::Paid);
    }
}
