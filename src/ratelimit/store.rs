//! Counter store trait for abstracting Redis and in-process implementations.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to connect to counter store: {0}")]
    Connection(String),
    #[error("Counter store command failed: {0}")]
    Backend(String),
    #[error("Counter store operation timed out after {0:?}")]
    Timeout(Duration),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

/// Result type for counter store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A shared key-value store with sorted-set semantics.
///
/// Every operation touches a single key and is atomic on its own, which is
/// what allows many service instances to share one store without
/// multi-key transactions. Scores are Unix milliseconds.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Remove members with a score in `[min, max]`, returning how many were removed.
    async fn prune_by_score(&self, key: &str, min: i64, max: i64) -> StoreResult<u64>;

    /// Number of members under `key`.
    async fn cardinality(&self, key: &str) -> StoreResult<u64>;

    /// The lowest-scored member and its score, if any.
    async fn oldest(&self, key: &str) -> StoreResult<Option<(String, i64)>>;

    /// Add a member with the given score.
    async fn add_with_score(&self, key: &str, score: i64, member: &str) -> StoreResult<()>;

    /// Expire `key` after `seconds`.
    async fn set_expiry(&self, key: &str, seconds: u64) -> StoreResult<()>;

    /// Check that the store is reachable.
    async fn ping(&self) -> StoreResult<()>;
}

/// Availability of the counter store, decided at startup.
#[derive(Clone)]
pub enum CounterBackend {
    /// A connected store
    Available(Arc<dyn CounterStore>),
    /// No store configured, or the initial connection failed
    Unconfigured,
}

impl CounterBackend {
    /// Whether a store is attached.
    pub fn is_available(&self) -> bool {
        matches!(self, CounterBackend::Available(_))
    }
}

impl std::fmt::Debug for CounterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CounterBackend::Available(_) => f.write_str("CounterBackend::Available"),
            CounterBackend::Unconfigured => f.write_str("CounterBackend::Unconfigured"),
        }
    }
}
