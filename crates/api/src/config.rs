//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON logs, anything else for plain text
/// - `DATABASE_URL`: PostgreSQL URL; the in-memory store is used when unset
/// - `GATEWAY_BASE_URL`, `GATEWAY_CLIENT_ID`, `GATEWAY_CLIENT_SECRET`,
///   `GATEWAY_API_VERSION`: payment gateway; an in-memory gateway is used
///   when the base URL is unset
/// - `WEBHOOK_SECRET`: shared secret for webhook signatures (required)
/// - `WEBHOOK_TOLERANCE_SECS`: optional replay window for webhook timestamps
/// - `CARRIER_BASE_URL`, `CARRIER_API_TOKEN`, `CARRIER_PICKUP_LOCATION`:
///   logistics carrier; an in-memory carrier is used when the base URL is unset
/// - `UPSTREAM_TIMEOUT_SECS`: timeout for gateway and carrier calls (default: `10`)
/// - `SNAPSHOT_CACHE_TTL_SECS`: order snapshot cache TTL (default: `900`)
/// - `SHIPMENT_CLAIM_LEASE_SECS`: shipment claim lease (default: `300`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub database_url: Option<String>,
    pub gateway_base_url: Option<String>,
    pub gateway_client_id: String,
    pub gateway_client_secret: String,
    pub gateway_api_version: String,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: Option<u64>,
    pub carrier_base_url: Option<String>,
    pub carrier_api_token: String,
    pub carrier_pickup_location: String,
    pub upstream_timeout: Duration,
    pub snapshot_cache_ttl: Duration,
    pub shipment_claim_lease: Duration,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    var(name).and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parsed("PORT").unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_json: var("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            database_url: var("DATABASE_URL"),
            gateway_base_url: var("GATEWAY_BASE_URL"),
            gateway_client_id: var("GATEWAY_CLIENT_ID").unwrap_or_default(),
            gateway_client_secret: var("GATEWAY_CLIENT_SECRET").unwrap_or_default(),
            gateway_api_version: var("GATEWAY_API_VERSION")
                .unwrap_or(defaults.gateway_api_version),
            webhook_secret: var("WEBHOOK_SECRET").unwrap_or_default(),
            webhook_tolerance_secs: parsed("WEBHOOK_TOLERANCE_SECS"),
            carrier_base_url: var("CARRIER_BASE_URL"),
            carrier_api_token: var("CARRIER_API_TOKEN").unwrap_or_default(),
            carrier_pickup_location: var("CARRIER_PICKUP_LOCATION")
                .unwrap_or(defaults.carrier_pickup_location),
            upstream_timeout: parsed("UPSTREAM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream_timeout),
            snapshot_cache_ttl: parsed("SNAPSHOT_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.snapshot_cache_ttl),
            shipment_claim_lease: parsed("SHIPMENT_CLAIM_LEASE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shipment_claim_lease),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            database_url: None,
            gateway_base_url: None,
            gateway_client_id: String::new(),
            gateway_client_secret: String::new(),
            gateway_api_version: "2023-08-01".to_string(),
            webhook_secret: String::new(),
            webhook_tolerance_secs: None,
            carrier_base_url: None,
            carrier_api_token: String::new(),
            carrier_pickup_location: "Primary Warehouse".to_string(),
            upstream_timeout: Duration::from_secs(10),
            snapshot_cache_ttl: Duration::from_secs(900),
            shipment_claim_lease: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.upstream_timeout, Duration::from_secs(10));
        assert_eq!(config.snapshot_cache_ttl, Duration::from_secs(900));
        assert_eq!(config.shipment_claim_lease, Duration::from_secs(300));
        assert!(config.database_url.is_none());
        assert!(config.webhook_tolerance_secs.is_none());
    }

    #[test]
    fn test_claim_lease_outlasts_upstream_timeout() {
        let config = Config::default();
        assert!(config.shipment_claim_lease > config.upstream_timeout);
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_addr_default() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }
}
