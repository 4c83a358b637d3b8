//! Configuration management for Clickgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::links::RedirectScope;
use crate::ratelimit::QuotaTable;

/// Prefix for environment variable overrides (`CLICKGATE__SERVER__HTTP_ADDR`).
const ENV_PREFIX: &str = "CLICKGATE";

/// Main configuration for the Clickgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClickgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter store (rate limiting backend) configuration
    #[serde(default)]
    pub counter_store: CounterStoreConfig,

    /// Relational store configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Short link configuration
    #[serde(default)]
    pub links: LinksConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Where unknown short keys are redirected
    #[serde(default = "default_not_found_url")]
    pub not_found_url: String,

    /// Header carrying the authenticated user's email, set by the upstream
    /// session provider
    #[serde(default = "default_principal_header")]
    pub principal_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            not_found_url: default_not_found_url(),
            principal_header: default_principal_header(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_not_found_url() -> String {
    "/404".to_string()
}

fn default_principal_header() -> String {
    "x-authenticated-email".to_string()
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterStoreConfig {
    /// Redis connection URL. Rate limiting fails open when unset.
    #[serde(default)]
    pub url: Option<String>,

    /// Prefix prepended to every rate limit identifier
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Upper bound on a single store operation, in milliseconds
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,

    /// Reconnect interval while the store is unreachable (0 disables)
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

impl Default for CounterStoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            key_prefix: default_key_prefix(),
            op_timeout_ms: default_op_timeout_ms(),
            probe_interval_secs: default_probe_interval(),
        }
    }
}

fn default_key_prefix() -> String {
    "rate_limit:".to_string()
}

fn default_op_timeout_ms() -> u64 {
    500
}

fn default_probe_interval() -> u64 {
    30
}

/// Relational store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. An in-process store is used when unset.
    #[serde(default)]
    pub url: Option<String>,

    /// Connection pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Apply pending migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            run_migrations: default_run_migrations(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_run_migrations() -> bool {
    true
}

/// Short link configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Domain new links are created under, and the redirect domain when
    /// the request does not name one
    #[serde(default = "default_domain")]
    pub default_domain: String,

    /// Whether redirects match on `(domain, key)` or on the key alone
    #[serde(default)]
    pub redirect_scope: RedirectScope,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            default_domain: default_domain(),
            redirect_scope: RedirectScope::default(),
        }
    }
}

fn default_domain() -> String {
    "clickgate.link".to_string()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Per-class quota overrides
    #[serde(default)]
    pub quotas: QuotaTable,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ClickgateConfig {
    /// Load configuration from an optional YAML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| crate::error::ClickgateError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::QuotaClass;

    #[test]
    fn test_defaults() {
        let config = ClickgateConfig::default();
        assert_eq!(config.server.http_addr.port(), 3000);
        assert_eq!(config.server.not_found_url, "/404");
        assert!(config.counter_store.url.is_none());
        assert_eq!(config.counter_store.key_prefix, "rate_limit:");
        assert_eq!(config.links.default_domain, "clickgate.link");
        assert_eq!(config.links.redirect_scope, RedirectScope::DomainAndKey);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
server:
  http_addr: "0.0.0.0:8080"
counter_store:
  url: "redis://127.0.0.1/"
links:
  redirect_scope: key_only
rate_limiting:
  quotas:
    auth:
      interval_secs: 600
      max_requests: 3
"#;
        let config = ClickgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.http_addr.port(), 8080);
        assert_eq!(config.server.principal_header, "x-authenticated-email");
        assert_eq!(config.counter_store.url.as_deref(), Some("redis://127.0.0.1/"));
        assert_eq!(config.counter_store.op_timeout_ms, 500);
        assert_eq!(config.links.redirect_scope, RedirectScope::KeyOnly);
        assert_eq!(config.links.default_domain, "clickgate.link");

        let auth = config.rate_limiting.quotas.get(QuotaClass::Auth);
        assert_eq!(auth.interval_secs, 600);
        assert_eq!(auth.max_requests, 3);

        // Untouched classes keep their defaults
        let links = config.rate_limiting.quotas.get(QuotaClass::Links);
        assert_eq!(links.interval_secs, 60);
        assert_eq!(links.max_requests, 20);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let result = ClickgateConfig::from_yaml("server: [not, a, map]");
        assert!(matches!(result, Err(crate::error::ClickgateError::Config(_))));
    }
}
