//! Payment gateway trait, HTTP client, and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Currency, OrderId};
use domain::{CustomerDetails, CustomerId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::FulfillmentError;

const SERVICE: &str = "payment_gateway";

/// Everything the gateway needs to open a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub order_id: OrderId,
    pub amount_minor: i64,
    pub currency: Currency,
    pub customer_id: CustomerId,
    pub customer: CustomerDetails,
    pub return_url: String,
}

/// A checkout session opened by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySession {
    /// The order id as echoed by the gateway.
    pub order_id: String,
    pub session_token: String,
    pub amount_minor: i64,
}

/// The gateway's view of an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrder {
    pub order_id: String,
    /// Status string, verbatim.
    pub order_status: String,
    pub amount_minor: i64,
    pub currency: Currency,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
}

/// Trait for payment gateway operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a checkout session for an order.
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<GatewaySession, FulfillmentError>;

    /// Fetches an order directly from the gateway. Returns `None` if the
    /// gateway does not know it.
    async fn fetch_order(&self, order_id: &OrderId)
    -> Result<Option<GatewayOrder>, FulfillmentError>;
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<GatewaySession, FulfillmentError> {
        (**self).create_session(request).await
    }

    async fn fetch_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<GatewayOrder>, FulfillmentError> {
        (**self).fetch_order(order_id).await
    }
}

/// Connection settings for [`HttpPaymentGateway`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub api_version: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    order_id: &'a str,
    order_amount: i64,
    order_currency: &'a str,
    customer_details: CustomerBody<'a>,
    order_meta: OrderMeta<'a>,
}

#[derive(Serialize)]
struct CustomerBody<'a> {
    customer_id: &'a str,
    customer_name: &'a str,
    customer_email: &'a str,
    customer_phone: &'a str,
}

#[derive(Serialize)]
struct OrderMeta<'a> {
    return_url: &'a str,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    order_id: String,
    payment_session_id: String,
    order_amount: i64,
}

#[derive(Deserialize)]
struct OrderResponse {
    order_id: String,
    order_status: String,
    order_amount: i64,
    #[serde(default)]
    order_currency: Option<String>,
    #[serde(default)]
    customer_details: Option<CustomerResponse>,
}

#[derive(Deserialize)]
struct CustomerResponse {
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
}

/// Payment gateway client over HTTP.
///
/// Amounts on the wire are in minor units. Every request is bounded by the
/// configured timeout.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    config: Arc<GatewayConfig>,
}

impl HttpPaymentGateway {
    /// Creates a client with the given settings.
    pub fn new(config: GatewayConfig) -> Result<Self, FulfillmentError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FulfillmentError::upstream(SERVICE, e.to_string()))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("x-client-id", &self.config.client_id)
            .header("x-client-secret", &self.config.client_secret)
            .header("x-api-version", &self.config.api_version)
    }

    fn transport_error(&self, err: reqwest::Error) -> FulfillmentError {
        if err.is_timeout() {
            FulfillmentError::Timeout {
                service: SERVICE,
                after: self.config.timeout,
            }
        } else {
            FulfillmentError::upstream(SERVICE, err.to_string())
        }
    }
}

async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("HTTP {status}: {body}")
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<GatewaySession, FulfillmentError> {
        let body = CreateOrderBody {
            order_id: request.order_id.as_str(),
            order_amount: request.amount_minor,
            order_currency: request.currency.code(),
            customer_details: CustomerBody {
                customer_id: request.customer_id.as_str(),
                customer_name: &request.customer.name,
                customer_email: &request.customer.email,
                customer_phone: &request.customer.phone,
            },
            order_meta: OrderMeta {
                return_url: &request.return_url,
            },
        };

        let response = self
            .request(reqwest::Method::POST, "/orders")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(FulfillmentError::upstream(SERVICE, error_body(response).await));
        }

        let created: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| FulfillmentError::upstream(SERVICE, format!("bad response: {e}")))?;

        if created.payment_session_id.is_empty() {
            return Err(FulfillmentError::upstream(SERVICE, "empty payment session id"));
        }

        Ok(GatewaySession {
            order_id: created.order_id,
            session_token: created.payment_session_id,
            amount_minor: created.order_amount,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<GatewayOrder>, FulfillmentError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/orders/{order_id}"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(FulfillmentError::upstream(SERVICE, error_body(response).await));
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| FulfillmentError::upstream(SERVICE, format!("bad response: {e}")))?;

        let currency = match order.order_currency.as_deref() {
            None => Currency::default(),
            Some(code) => Currency::parse(code).ok_or_else(|| {
                FulfillmentError::upstream(SERVICE, format!("unsupported currency {code}"))
            })?,
        };
        let customer = order.customer_details.unwrap_or(CustomerResponse {
            customer_name: None,
            customer_email: None,
        });

        Ok(Some(GatewayOrder {
            order_id: order.order_id,
            order_status: order.order_status,
            amount_minor: order.order_amount,
            currency,
            customer_name: customer.customer_name,
            customer_email: customer.customer_email,
        }))
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    orders: HashMap<String, GatewayOrder>,
    next_session: u32,
    session_calls: usize,
    fetch_calls: usize,
    fail_on_create: bool,
    fail_on_fetch: bool,
    echo_override: Option<String>,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail session creation.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Configures the gateway to fail order lookups.
    pub async fn set_fail_on_fetch(&self, fail: bool) {
        self.state.write().await.fail_on_fetch = fail;
    }

    /// Makes the gateway echo a different order id than it was given.
    pub async fn set_echo_override(&self, order_id: Option<String>) {
        self.state.write().await.echo_override = order_id;
    }

    /// Sets the status the gateway reports for an order.
    pub async fn set_order_status(&self, order_id: &OrderId, status: &str) {
        if let Some(order) = self.state.write().await.orders.get_mut(order_id.as_str()) {
            order.order_status = status.to_string();
        }
    }

    /// Registers an order the gateway knows about.
    pub async fn insert_order(&self, order: GatewayOrder) {
        self.state
            .write()
            .await
            .orders
            .insert(order.order_id.clone(), order);
    }

    /// Returns the number of sessions requested.
    pub async fn session_calls(&self) -> usize {
        self.state.read().await.session_calls
    }

    /// Returns the number of order lookups made.
    pub async fn fetch_calls(&self) -> usize {
        self.state.read().await.fetch_calls
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<GatewaySession, FulfillmentError> {
        let mut state = self.state.write().await;
        state.session_calls += 1;

        if state.fail_on_create {
            return Err(FulfillmentError::upstream(SERVICE, "session creation refused"));
        }

        state.next_session += 1;
        let session_token = format!("session_{:04}", state.next_session);
        let echoed = state
            .echo_override
            .clone()
            .unwrap_or_else(|| request.order_id.to_string());

        state.orders.insert(
            request.order_id.to_string(),
            GatewayOrder {
                order_id: request.order_id.to_string(),
                order_status: "ACTIVE".to_string(),
                amount_minor: request.amount_minor,
                currency: request.currency,
                customer_name: Some(request.customer.name.clone()),
                customer_email: Some(request.customer.email.clone()),
            },
        );

        Ok(GatewaySession {
            order_id: echoed,
            session_token,
            amount_minor: request.amount_minor,
        })
    }

    async fn fetch_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<GatewayOrder>, FulfillmentError> {
        let mut state = self.state.write().await;
        state.fetch_calls += 1;

        if state.fail_on_fetch {
            return Err(FulfillmentError::upstream(SERVICE, "gateway unavailable"));
        }

        Ok(state.orders.get(order_id.as_str()).cloned())
    }
}
