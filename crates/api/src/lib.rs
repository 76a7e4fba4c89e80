//! HTTP API server with observability for the order fulfillment system.
//!
//! Provides REST endpoints for order intake, payment webhooks, order
//! lookup, and pincode serviceability, with structured logging (tracing)
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::BillingCalculator;
use fulfillment::services::{Carrier, InMemoryCarrier, InMemoryPaymentGateway, PaymentGateway};
use fulfillment::{
    OrderIntake, PincodeServiceabilityChecker, ReconciliationResolver, ShipmentDispatcher,
    SignatureVerifier, SnapshotCache, WebhookIngress,
};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, G, C>(
    state: Arc<AppState<S, G, C>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    S: OrderStore + Clone + 'static,
    G: PaymentGateway + 'static,
    C: Carrier + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S, G, C>))
        .route("/orders/{id}", get(routes::orders::get::<S, G, C>))
        .route("/webhooks/payment", post(routes::webhooks::payment::<S, G, C>))
        .route(
            "/pincodes/{pincode}/serviceability",
            get(routes::pincodes::serviceability::<S, G, C>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the fulfillment services around the given store, gateway, and carrier.
pub fn create_state<S, G, C>(
    config: &Config,
    store: S,
    gateway: G,
    carrier: C,
) -> Arc<AppState<S, G, C>>
where
    S: OrderStore + Clone + 'static,
    G: PaymentGateway + Clone + 'static,
    C: Carrier + Clone + 'static,
{
    let cache = SnapshotCache::new(config.snapshot_cache_ttl);

    let mut verifier = SignatureVerifier::new(config.webhook_secret.clone());
    if let Some(tolerance) = config.webhook_tolerance_secs {
        verifier = verifier.with_tolerance(tolerance);
    }

    let dispatcher = ShipmentDispatcher::new(store.clone(), carrier.clone())
        .with_timeout(config.upstream_timeout)
        .with_lease(config.shipment_claim_lease);

    Arc::new(AppState {
        intake: OrderIntake::new(
            store.clone(),
            gateway.clone(),
            BillingCalculator::default(),
            cache.clone(),
        ),
        webhooks: WebhookIngress::new(store.clone(), dispatcher, cache.clone(), verifier),
        resolver: ReconciliationResolver::standard(cache, store, gateway),
        serviceability: PincodeServiceabilityChecker::new(carrier),
    })
}

/// Creates application state with an in-memory gateway and carrier.
pub fn create_default_state<S>(
    config: &Config,
    store: S,
) -> Arc<AppState<S, InMemoryPaymentGateway, InMemoryCarrier>>
where
    S: OrderStore + Clone + 'static,
{
    create_state(
        config,
        store,
        InMemoryPaymentGateway::new(),
        InMemoryCarrier::new(),
    )
}
