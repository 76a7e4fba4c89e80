//! API server entry point.

use std::sync::Arc;

use fulfillment::services::{
    Carrier, CarrierConfig, DelhiveryCarrier, GatewayConfig, HttpPaymentGateway,
    InMemoryCarrier, InMemoryPaymentGateway, PaymentGateway,
};
use order_store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use api::config::Config;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn order_store(config: &Config) -> Arc<dyn OrderStore> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresOrderStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL order store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            Arc::new(InMemoryOrderStore::new())
        }
    }
}

fn payment_gateway(config: &Config) -> Arc<dyn PaymentGateway> {
    match &config.gateway_base_url {
        Some(base_url) => Arc::new(
            HttpPaymentGateway::new(GatewayConfig {
                base_url: base_url.clone(),
                client_id: config.gateway_client_id.clone(),
                client_secret: config.gateway_client_secret.clone(),
                api_version: config.gateway_api_version.clone(),
                timeout: config.upstream_timeout,
            })
            .expect("failed to build payment gateway client"),
        ),
        None => {
            tracing::warn!("GATEWAY_BASE_URL not set, using the in-memory payment gateway");
            Arc::new(InMemoryPaymentGateway::new())
        }
    }
}

fn carrier(config: &Config) -> Arc<dyn Carrier> {
    match &config.carrier_base_url {
        Some(base_url) => Arc::new(
            DelhiveryCarrier::new(CarrierConfig {
                base_url: base_url.clone(),
                api_token: config.carrier_api_token.clone(),
                pickup_location: config.carrier_pickup_location.clone(),
                timeout: config.upstream_timeout,
            })
            .expect("failed to build carrier client"),
        ),
        None => {
            tracing::warn!("CARRIER_BASE_URL not set, using the in-memory carrier");
            Arc::new(InMemoryCarrier::new())
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    if config.webhook_secret.is_empty() {
        panic!("WEBHOOK_SECRET must be set");
    }

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Create collaborators and application state
    let store = order_store(&config).await;
    let state = api::create_state(&config, store, payment_gateway(&config), carrier(&config));

    // 4. Build the application
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
