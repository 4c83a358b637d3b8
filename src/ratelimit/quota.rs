//! Named quota classes and their window configurations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A class of rate-limited operation.
///
/// Each class is an independent identifier namespace: the class name is
/// always the first segment of the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaClass {
    /// Registration and sign-in attempts
    Auth,
    /// Link creation
    Links,
    /// Analytics reads
    Analytics,
    /// Generic API traffic, including redirects
    Api,
}

impl QuotaClass {
    /// Identifier prefix for this class.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaClass::Auth => "auth",
            QuotaClass::Links => "links",
            QuotaClass::Analytics => "analytics",
            QuotaClass::Api => "api",
        }
    }
}

impl fmt::Display for QuotaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sliding window quota: at most `max_requests` within `interval_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Length of the trailing window in seconds
    pub interval_secs: u64,
    /// Requests admitted per window
    pub max_requests: u32,
}

impl QuotaConfig {
    /// Create a new quota.
    pub const fn new(interval_secs: u64, max_requests: u32) -> Self {
        Self {
            interval_secs,
            max_requests,
        }
    }

    /// Window length in milliseconds.
    pub fn interval_millis(&self) -> i64 {
        (self.interval_secs as i64).saturating_mul(1000)
    }
}

const AUTH_QUOTA: QuotaConfig = QuotaConfig::new(300, 5);
const LINKS_QUOTA: QuotaConfig = QuotaConfig::new(60, 20);
const ANALYTICS_QUOTA: QuotaConfig = QuotaConfig::new(60, 30);
const API_QUOTA: QuotaConfig = QuotaConfig::new(60, 60);

/// The quota of every class, fixed once the service has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaTable {
    #[serde(default = "default_auth")]
    auth: QuotaConfig,
    #[serde(default = "default_links")]
    links: QuotaConfig,
    #[serde(default = "default_analytics")]
    analytics: QuotaConfig,
    #[serde(default = "default_api")]
    api: QuotaConfig,
}

impl Default for QuotaTable {
    fn default() -> Self {
        Self {
            auth: AUTH_QUOTA,
            links: LINKS_QUOTA,
            analytics: ANALYTICS_QUOTA,
            api: API_QUOTA,
        }
    }
}

fn default_auth() -> QuotaConfig {
    AUTH_QUOTA
}

fn default_links() -> QuotaConfig {
    LINKS_QUOTA
}

fn default_analytics() -> QuotaConfig {
    ANALYTICS_QUOTA
}

fn default_api() -> QuotaConfig {
    API_QUOTA
}

impl QuotaTable {
    /// Get the quota for a class.
    pub fn get(&self, class: QuotaClass) -> QuotaConfig {
        match class {
            QuotaClass::Auth => self.auth,
            QuotaClass::Links => self.links,
            QuotaClass::Analytics => self.analytics,
            QuotaClass::Api => self.api,
        }
    }

    /// Return a copy with one class replaced.
    pub fn with(mut self, class: QuotaClass, quota: QuotaConfig) -> Self {
        match class {
            QuotaClass::Auth => self.auth = quota,
            QuotaClass::Links => self.links = quota,
            QuotaClass::Analytics => self.analytics = quota,
            QuotaClass::Api => self.api = quota,
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_quotas() {
        let table = QuotaTable::default();
        assert_eq!(table.get(QuotaClass::Auth), QuotaConfig::new(300, 5));
        assert_eq!(table.get(QuotaClass::Links), QuotaConfig::new(60, 20));
        assert_eq!(table.get(QuotaClass::Analytics), QuotaConfig::new(60, 30));
        assert_eq!(table.get(QuotaClass::Api), QuotaConfig::new(60, 60));
    }

    #[test]
    fn test_override_single_class() {
        let table = QuotaTable::default().with(QuotaClass::Api, QuotaConfig::new(10, 2));
        assert_eq!(table.get(QuotaClass::Api), QuotaConfig::new(10, 2));
        assert_eq!(table.get(QuotaClass::Auth), QuotaConfig::new(300, 5));
    }

    #[test]
    fn test_parse_partial_table() {
        let yaml = r#"
links:
  interval_secs: 30
  max_requests: 10
"#;
        let table: QuotaTable = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(table.get(QuotaClass::Links), QuotaConfig::new(30, 10));
        assert_eq!(table.get(QuotaClass::Analytics), QuotaConfig::new(60, 30));
    }

    #[test]
    fn test_interval_millis() {
        assert_eq!(QuotaConfig::new(60, 1).interval_millis(), 60_000);
    }
}
