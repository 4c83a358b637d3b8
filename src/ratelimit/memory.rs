//! In-process counter store.
//!
//! Implements the same sorted-set contract as the Redis store so tests can
//! drive the sliding window with a manual clock. Expired keys are only
//! evicted when touched again, so it is not meant for long-running use.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::store::{CounterStore, StoreResult};
use crate::clock::{Clock, SystemClock};

/// One sorted set plus its optional expiry deadline.
#[derive(Debug, Default)]
struct SortedWindow {
    /// Members ordered by (score, member)
    members: BTreeSet<(i64, String)>,
    /// Unix millis after which the whole key is gone
    expires_at: Option<i64>,
}

impl SortedWindow {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// Counter store held in process memory.
#[derive(Debug)]
pub struct InMemoryCounterStore {
    windows: DashMap<String, SortedWindow>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    /// Create a store that expires keys against the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store that expires keys against the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
        }
    }

    /// Number of live keys.
    pub fn key_count(&self) -> usize {
        let now = self.clock.now_millis();
        self.windows.iter().filter(|w| !w.is_expired(now)).count()
    }

    /// Drop the key if its expiry has passed.
    fn evict_if_expired(&self, key: &str) {
        let now = self.clock.now_millis();
        self.windows.remove_if(key, |_, window| window.is_expired(now));
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn prune_by_score(&self, key: &str, min: i64, max: i64) -> StoreResult<u64> {
        self.evict_if_expired(key);
        let Some(mut window) = self.windows.get_mut(key) else {
            return Ok(0);
        };

        let before = window.members.len();
        window
            .members
            .retain(|(score, _)| *score < min || *score > max);
        Ok((before - window.members.len()) as u64)
    }

    async fn cardinality(&self, key: &str) -> StoreResult<u64> {
        self.evict_if_expired(key);
        Ok(self
            .windows
            .get(key)
            .map(|w| w.members.len() as u64)
            .unwrap_or(0))
    }

    async fn oldest(&self, key: &str) -> StoreResult<Option<(String, i64)>> {
        self.evict_if_expired(key);
        Ok(self.windows.get(key).and_then(|w| {
            w.members
                .first()
                .map(|(score, member)| (member.clone(), *score))
        }))
    }

    async fn add_with_score(&self, key: &str, score: i64, member: &str) -> StoreResult<()> {
        self.evict_if_expired(key);
        self.windows
            .entry(key.to_string())
            .or_default()
            .members
            .insert((score, member.to_string()));
        Ok(())
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> StoreResult<()> {
        let deadline = self.clock.now_millis() + (seconds as i64).saturating_mul(1000);
        if let Some(mut window) = self.windows.get_mut(key) {
            window.expires_at = Some(deadline);
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    #[tokio::test]
    async fn test_add_and_count() {
        let store = InMemoryCounterStore::new();
        store.add_with_score("k", 10, "a").await.unwrap();
        store.add_with_score("k", 20, "b").await.unwrap();

        assert_eq!(store.cardinality("k").await.unwrap(), 2);
        assert_eq!(store.cardinality("other").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_is_inclusive() {
        let store = InMemoryCounterStore::new();
        store.add_with_score("k", 100, "a").await.unwrap();
        store.add_with_score("k", 200, "b").await.unwrap();
        store.add_with_score("k", 300, "c").await.unwrap();

        let removed = store.prune_by_score("k", 0, 200).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.oldest("k").await.unwrap(), Some(("c".to_string(), 300)));
    }

    #[tokio::test]
    async fn test_same_score_distinct_members() {
        let store = InMemoryCounterStore::new();
        store.add_with_score("k", 5, "x").await.unwrap();
        store.add_with_score("k", 5, "y").await.unwrap();
        assert_eq!(store.cardinality("k").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_key_expires() {
        let clock = Arc::new(ManualClock::new(0));
        let store = InMemoryCounterStore::with_clock(clock.clone());

        store.add_with_score("k", 0, "a").await.unwrap();
        store.set_expiry("k", 60).await.unwrap();
        assert_eq!(store.key_count(), 1);

        clock.advance(Duration::from_secs(60));
        assert_eq!(store.cardinality("k").await.unwrap(), 0);
        assert_eq!(store.key_count(), 0);
    }
}
