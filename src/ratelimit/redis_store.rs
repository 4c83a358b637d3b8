//! Redis-backed counter store.
//!
//! Windows are Redis sorted sets, one key per identifier. Every command is
//! single-key, so concurrent service instances can share one Redis without
//! transactions. Each command is bounded by a timeout; a timed-out command
//! is reported as a store failure and the limiter fails open.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use super::store::{CounterStore, StoreError, StoreResult};

/// Counter store backed by Redis sorted sets.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    op_timeout: Duration,
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connect to Redis and verify the connection with a `PING`.
    pub async fn connect(url: &str, op_timeout: Duration) -> StoreResult<Self> {
        let client = Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;

        let connection = tokio::time::timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(op_timeout))??;

        let store = Self {
            connection,
            op_timeout,
        };
        store.ping().await?;

        info!(timeout_ms = op_timeout.as_millis() as u64, "Connected to Redis counter store");
        Ok(store)
    }

    /// Run one command with the configured timeout.
    async fn bounded<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn prune_by_score(&self, key: &str, min: i64, max: i64) -> StoreResult<u64> {
        let mut conn = self.connection.clone();
        let removed: u64 = self.bounded(conn.zrembyscore(key, min, max)).await?;
        debug!(key = key, removed = removed, "Pruned expired window entries");
        Ok(removed)
    }

    async fn cardinality(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.connection.clone();
        self.bounded(conn.zcard(key)).await
    }

    async fn oldest(&self, key: &str) -> StoreResult<Option<(String, i64)>> {
        let mut conn = self.connection.clone();
        let entries: Vec<(String, f64)> = self.bounded(conn.zrange_withscores(key, 0, 0)).await?;
        Ok(entries
            .into_iter()
            .next()
            .map(|(member, score)| (member, score as i64)))
    }

    async fn add_with_score(&self, key: &str, score: i64, member: &str) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = self.bounded(conn.zadd(key, member, score)).await?;
        Ok(())
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let _: bool = self.bounded(conn.expire(key, seconds as i64)).await?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let pong: String = self
            .bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Backend(format!("unexpected PING reply: {}", pong)))
        }
    }
}
