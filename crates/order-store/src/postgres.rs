use std::time::Duration;

use async_trait::async_trait;
use common::{Currency, Money, OrderId};
use domain::{
    BillingBreakdown, CustomerDetails, Order, OrderItem, PaymentMethod, PaymentStatus,
    PostalAddress, ShipmentStatus, WebhookEvent, WebhookEventId,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{OrderStore, Result, ShipmentClaim, StoreError};

const ORDER_COLUMNS: &str = "id, customer_id, customer_name, customer_email, customer_phone, \
    shipping_address, items, subtotal_paise, discount_paise, tax_paise, shipping_paise, \
    total_paise, currency, payment_method, payment_status, shipment_status, waybill, \
    shipment_error, gateway_status, created_at, updated_at";

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn order_exists(&self, id: &OrderId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
            .bind(id.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let id: String = row.try_get("id")?;
        let corrupt = |reason: String| StoreError::Corrupt {
            order_id: id.clone(),
            reason,
        };

        let order_id = OrderId::parse(id.clone()).map_err(|e| corrupt(e.to_string()))?;
        let address: Option<serde_json::Value> = row.try_get("shipping_address")?;
        let address: Option<PostalAddress> = address.map(serde_json::from_value).transpose()?;
        let items: Vec<OrderItem> = serde_json::from_value(row.try_get("items")?)?;

        let currency: String = row.try_get("currency")?;
        let currency = Currency::parse(&currency)
            .ok_or_else(|| corrupt(format!("unknown currency {currency}")))?;
        let payment_method: String = row.try_get("payment_method")?;
        let payment_method = PaymentMethod::parse(&payment_method)
            .ok_or_else(|| corrupt(format!("unknown payment method {payment_method}")))?;
        let payment_status: String = row.try_get("payment_status")?;
        let payment_status = PaymentStatus::parse(&payment_status)
            .ok_or_else(|| corrupt(format!("unknown payment status {payment_status}")))?;
        let shipment_status: String = row.try_get("shipment_status")?;
        let shipment_status = ShipmentStatus::parse(&shipment_status)
            .ok_or_else(|| corrupt(format!("unknown shipment status {shipment_status}")))?;

        let customer_id: String = row.try_get("customer_id")?;
        let customer = CustomerDetails {
            name: row.try_get("customer_name")?,
            email: row.try_get("customer_email")?,
            phone: row.try_get("customer_phone")?,
            address,
        };
        if customer.customer_id().as_str() != customer_id {
            return Err(corrupt("customer id does not match contact details".to_string()));
        }

        Ok(Order {
            id: order_id,
            customer_id: customer.customer_id(),
            customer,
            items,
            billing: BillingBreakdown {
                subtotal: Money::from_paise(row.try_get("subtotal_paise")?),
                discount: Money::from_paise(row.try_get("discount_paise")?),
                tax: Money::from_paise(row.try_get("tax_paise")?),
                shipping: Money::from_paise(row.try_get("shipping_paise")?),
                total: Money::from_paise(row.try_get("total_paise")?),
                currency,
            },
            payment_method,
            payment_status,
            shipment_status,
            waybill: row.try_get("waybill")?,
            shipment_error: row.try_get("shipment_error")?,
            gateway_status: row.try_get("gateway_status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_webhook_event(row: PgRow) -> Result<WebhookEvent> {
        let order_id: String = row.try_get("order_id")?;
        let order_id = OrderId::parse(order_id.clone()).map_err(|e| StoreError::Corrupt {
            order_id,
            reason: e.to_string(),
        })?;

        Ok(WebhookEvent {
            id: WebhookEventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id,
            event_type: row.try_get("event_type")?,
            order_status: row.try_get("order_status")?,
            raw_payload: row.try_get("raw_payload")?,
            received_at: row.try_get("received_at")?,
            processed: row.try_get("processed")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let address = order
            .customer
            .address
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let items = serde_json::to_value(&order.items)?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id, customer_name, customer_email, customer_phone,
                shipping_address, items, subtotal_paise, discount_paise, tax_paise,
                shipping_paise, total_paise, currency, payment_method, payment_status,
                shipment_status, waybill, shipment_error, gateway_status, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                $12, $13, $14, $15, $16, $17, $18, $19, $20, $21
            )
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.customer_id.as_str())
        .bind(&order.customer.name)
        .bind(&order.customer.email)
        .bind(&order.customer.phone)
        .bind(address)
        .bind(items)
        .bind(order.billing.subtotal.paise())
        .bind(order.billing.discount.paise())
        .bind(order.billing.tax.paise())
        .bind(order.billing.shipping.paise())
        .bind(order.billing.total.paise())
        .bind(order.billing.currency.code())
        .bind(order.payment_method.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.shipment_status.as_str())
        .bind(&order.waybill)
        .bind(&order.shipment_error)
        .bind(&order.gateway_status)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_pkey")
            {
                return StoreError::DuplicateOrder(order.id.clone());
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn delete_order(&self, id: &OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_payment_status(
        &self,
        id: &OrderId,
        expected: PaymentStatus,
        next: PaymentStatus,
        gateway_status: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment_status = $3, gateway_status = $4, updated_at = NOW()
            WHERE id = $1 AND payment_status = $2
            "#,
        )
        .bind(id.as_str())
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(gateway_status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        if self.order_exists(id).await? {
            Ok(false)
        } else {
            Err(StoreError::NotFound(id.clone()))
        }
    }

    async fn record_gateway_status(&self, id: &OrderId, gateway_status: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET gateway_status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(gateway_status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn claim_shipment(
        &self,
        id: &OrderId,
        lease: Duration,
    ) -> Result<Option<ShipmentClaim>> {
        let claim = ShipmentClaim::new();
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET shipment_claim = $2, shipment_claimed_at = $3
            WHERE id = $1
              AND waybill IS NULL
              AND (
                  shipment_claim IS NULL
                  OR shipment_claimed_at <= $3 - make_interval(secs => $4)
              )
            "#,
        )
        .bind(id.as_str())
        .bind(claim.token)
        .bind(claim.claimed_at)
        .bind(lease.as_secs_f64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(Some(claim));
        }
        if self.order_exists(id).await? {
            Ok(None)
        } else {
            Err(StoreError::NotFound(id.clone()))
        }
    }

    async fn record_waybill(
        &self,
        id: &OrderId,
        claim: &ShipmentClaim,
        waybill: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET waybill = $3,
                shipment_status = 'CREATED',
                shipment_error = NULL,
                shipment_claim = NULL,
                shipment_claimed_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND waybill IS NULL AND shipment_claim = $2
            "#,
        )
        .bind(id.as_str())
        .bind(claim.token)
        .bind(waybill)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_shipment_failure(
        &self,
        id: &OrderId,
        claim: &ShipmentClaim,
        reason: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET shipment_status = 'FAILED',
                shipment_error = $3,
                shipment_claim = NULL,
                shipment_claimed_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND waybill IS NULL AND shipment_claim = $2
            "#,
        )
        .bind(id.as_str())
        .bind(claim.token)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_webhook_event(&self, event: &WebhookEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_events
                (id, order_id, event_type, order_status, raw_payload, processed, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.order_id.as_str())
        .bind(&event.event_type)
        .bind(&event.order_status)
        .bind(&event.raw_payload)
        .bind(event.processed)
        .bind(event.received_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_webhook_processed(&self, id: WebhookEventId) -> Result<()> {
        sqlx::query("UPDATE webhook_events SET processed = TRUE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_event_processed(
        &self,
        order_id: &OrderId,
        event_type: &str,
        order_status: &str,
    ) -> Result<bool> {
        let processed: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM webhook_events
                WHERE order_id = $1
                  AND event_type = $2
                  AND UPPER(order_status) = UPPER($3)
                  AND processed
            )
            "#,
        )
        .bind(order_id.as_str())
        .bind(event_type)
        .bind(order_status)
        .fetch_one(&self.pool)
        .await?;

        Ok(processed)
    }

    async fn webhook_events_for_order(&self, order_id: &OrderId) -> Result<Vec<WebhookEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, event_type, order_status, raw_payload, processed, received_at
            FROM webhook_events
            WHERE order_id = $1
            ORDER BY received_at ASC
            "#,
        )
        .bind(order_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_webhook_event).collect()
    }
}

