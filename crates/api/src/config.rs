//! Application configuration loaded from environment variables.

use std::time::Duration;

use payments::{GatewayConfig, RedirectPages};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables, after loading an optional `.env` file:
/// - `HOST` (default `0.0.0.0`), `PORT` (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset selects the in-memory store
/// - `DATABASE_MAX_CONNECTIONS` (default `10`)
/// - `GATEWAY_BASE_URL`: unset selects the in-memory gateway
/// - `GATEWAY_CLIENT_ID`, `GATEWAY_CLIENT_SECRET`, `GATEWAY_API_VERSION`,
///   `GATEWAY_TIMEOUT_SECS`, `GATEWAY_CHECKOUT_URL`, `GATEWAY_WEBHOOK_SECRET`
/// - `FRONTEND_URL`: base for the payment redirect pages
/// - `BACKEND_URL`: public URL of this server
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub gateway: GatewayConfig,
    pub redirects: RedirectPages,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = GatewayConfig::default();
        let gateway = GatewayConfig {
            base_url: var("GATEWAY_BASE_URL"),
            client_id: var("GATEWAY_CLIENT_ID").unwrap_or_default(),
            client_secret: var("GATEWAY_CLIENT_SECRET").unwrap_or_default(),
            api_version: var("GATEWAY_API_VERSION").unwrap_or(defaults.api_version),
            timeout: Duration::from_secs(parsed("GATEWAY_TIMEOUT_SECS", 10)),
            checkout_url: var("GATEWAY_CHECKOUT_URL").unwrap_or(defaults.checkout_url),
            webhook_secret: var("GATEWAY_WEBHOOK_SECRET").unwrap_or_default(),
            backend_url: var("BACKEND_URL").unwrap_or(defaults.backend_url),
        };
        let redirects = var("FRONTEND_URL")
            .map(|url| RedirectPages::from_frontend(&url))
            .unwrap_or_default();

        Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed("PORT", 3000),
            log_level: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            database_url: var("DATABASE_URL"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10),
            gateway,
            redirects,
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
            database_url: None,
            database_max_connections: 10,
            gateway: GatewayConfig::default(),
            redirects: RedirectPages::default(),
        }
    }
}
