//! Sliding-window rate limiter.

use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::identifier::RateLimitIdentifier;
use super::quota::QuotaConfig;
use super::store::{CounterBackend, CounterStore, StoreResult};
use crate::clock::{Clock, SystemClock};

/// Default prefix for counter store keys.
const DEFAULT_KEY_PREFIX: &str = "rate_limit:";

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub admitted: bool,
    /// The quota ceiling that was applied
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Seconds until the window frees up a slot
    pub reset_secs: u64,
}

impl RateLimitDecision {
    /// Decision returned when the counter store cannot be consulted.
    pub fn fail_open(quota: &QuotaConfig) -> Self {
        Self {
            admitted: true,
            limit: quota.max_requests,
            remaining: quota.max_requests,
            reset_secs: quota.interval_secs,
        }
    }
}

/// Health of the counter store as seen by the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreHealth {
    /// Store attached and answering
    Healthy,
    /// Store attached but failing
    Unhealthy,
    /// No store attached
    Unavailable,
}

impl StoreHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreHealth::Healthy => "healthy",
            StoreHealth::Unhealthy => "unhealthy",
            StoreHealth::Unavailable => "unavailable",
        }
    }
}

/// Sliding-window rate limiter over a shared counter store.
///
/// The limiter keeps no window state of its own. It fails open: when the
/// store is unconfigured or a store call fails, the request is admitted and
/// the problem is logged once rather than per request.
pub struct SlidingWindowLimiter {
    backend: RwLock<CounterBackend>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    /// Set once the "not configured" warning has been emitted
    unconfigured_warned: AtomicBool,
    /// Set while store calls are failing
    degraded: AtomicBool,
}

impl SlidingWindowLimiter {
    /// Create a limiter over the given backend, using the system clock.
    pub fn new(backend: CounterBackend) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    /// Create a limiter with an explicit clock.
    pub fn with_clock(backend: CounterBackend, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend: RwLock::new(backend),
            clock,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            unconfigured_warned: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
        }
    }

    /// Override the prefix prepended to identifiers.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Whether a counter store is attached.
    pub fn is_available(&self) -> bool {
        self.backend.read().is_available()
    }

    /// Attach a new backend, e.g. after a successful reconnect.
    pub fn set_backend(&self, backend: CounterBackend) {
        *self.backend.write() = backend;
    }

    /// Check the quota for `identifier` and, if admitted, record the request.
    pub async fn check_and_consume(
        &self,
        identifier: &RateLimitIdentifier,
        quota: &QuotaConfig,
    ) -> RateLimitDecision {
        let backend = self.backend.read().clone();
        let store = match backend {
            CounterBackend::Available(store) => store,
            CounterBackend::Unconfigured => {
                if !self.unconfigured_warned.swap(true, Ordering::Relaxed) {
                    warn!("Rate limiting is disabled (counter store not configured)");
                }
                return RateLimitDecision::fail_open(quota);
            }
        };

        let key = format!("{}{}", self.key_prefix, identifier);

        trace!(
            key = %key,
            interval_secs = quota.interval_secs,
            max_requests = quota.max_requests,
            "Checking rate limit"
        );

        match self.evaluate(store.as_ref(), &key, quota).await {
            Ok(decision) => {
                if self.degraded.swap(false, Ordering::Relaxed) {
                    info!("Counter store recovered, rate limiting resumed");
                }
                if !decision.admitted {
                    debug!(
                        key = %key,
                        reset_secs = decision.reset_secs,
                        "Rate limit exceeded"
                    );
                }
                decision
            }
            Err(e) => {
                if !self.degraded.swap(true, Ordering::Relaxed) {
                    warn!(
                        error = %e,
                        "Counter store unavailable, admitting requests until it recovers"
                    );
                } else {
                    trace!(error = %e, key = %key, "Counter store still failing");
                }
                RateLimitDecision::fail_open(quota)
            }
        }
    }

    /// Run the sliding-window algorithm against the store.
    async fn evaluate(
        &self,
        store: &dyn CounterStore,
        key: &str,
        quota: &QuotaConfig,
    ) -> StoreResult<RateLimitDecision> {
        let now = self.clock.now_millis();
        let interval_ms = quota.interval_millis();
        let window_start = now - interval_ms;

        // An entry exactly at the window start is already expired.
        store.prune_by_score(key, 0, window_start).await?;
        let live = store.cardinality(key).await?;

        if live >= u64::from(quota.max_requests) {
            let reset_secs = match store.oldest(key).await? {
                Some((_, oldest)) => ceil_secs(oldest + interval_ms - now).max(1),
                None => quota.interval_secs,
            };
            return Ok(RateLimitDecision {
                admitted: false,
                limit: quota.max_requests,
                remaining: 0,
                reset_secs,
            });
        }

        let member = format!("{}-{}", now, Uuid::new_v4());
        store.add_with_score(key, now, &member).await?;
        store.set_expiry(key, quota.interval_secs).await?;

        Ok(RateLimitDecision {
            admitted: true,
            limit: quota.max_requests,
            remaining: quota.max_requests - live as u32 - 1,
            reset_secs: quota.interval_secs,
        })
    }

    /// Probe the attached store.
    pub async fn health(&self) -> StoreHealth {
        let backend = self.backend.read().clone();
        match backend {
            CounterBackend::Unconfigured => StoreHealth::Unavailable,
            CounterBackend::Available(store) => match store.ping().await {
                Ok(()) => StoreHealth::Healthy,
                Err(e) => {
                    debug!(error = %e, "Counter store health probe failed");
                    StoreHealth::Unhealthy
                }
            },
        }
    }

    /// Periodically try to attach a store while none is available.
    ///
    /// The task ends after the first successful `connect`.
    pub fn spawn_reprobe<F, Fut>(self: Arc<Self>, interval: Duration, connect: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = StoreResult<Arc<dyn CounterStore>>> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if self.is_available() {
                    return;
                }

                match connect().await {
                    Ok(store) => {
                        self.set_backend(CounterBackend::Available(store));
                        info!("Counter store reachable, rate limiting enabled");
                        return;
                    }
                    Err(e) => {
                        debug!(error = %e, "Counter store still unreachable");
                    }
                }
            }
        })
    }
}

/// Milliseconds to whole seconds, rounding up.
fn ceil_secs(millis: i64) -> u64 {
    if millis <= 0 {
        0
    } else {
        ((millis + 999) / 1000) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ratelimit::memory::InMemoryCounterStore;
    use crate::ratelimit::quota::QuotaClass;
    use crate::ratelimit::store::StoreError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// A store whose every call fails, standing in for an unreachable Redis.
    struct UnreachableStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CounterStore for UnreachableStore {
        async fn prune_by_score(&self, _: &str, _: i64, _: i64) -> StoreResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Connection("connection refused".to_string()))
        }
        async fn cardinality(&self, _: &str) -> StoreResult<u64> {
            Err(StoreError::Connection("connection refused".to_string()))
        }
        async fn oldest(&self, _: &str) -> StoreResult<Option<(String, i64)>> {
            Err(StoreError::Connection("connection refused".to_string()))
        }
        async fn add_with_score(&self, _: &str, _: i64, _: &str) -> StoreResult<()> {
            Err(StoreError::Connection("connection refused".to_string()))
        }
        async fn set_expiry(&self, _: &str, _: u64) -> StoreResult<()> {
            Err(StoreError::Connection("connection refused".to_string()))
        }
        async fn ping(&self) -> StoreResult<()> {
            Err(StoreError::Connection("connection refused".to_string()))
        }
    }

    fn memory_limiter(clock: Arc<ManualClock>) -> (SlidingWindowLimiter, Arc<InMemoryCounterStore>) {
        let store = Arc::new(InMemoryCounterStore::with_clock(clock.clone()));
        let limiter =
            SlidingWindowLimiter::with_clock(CounterBackend::Available(store.clone()), clock);
        (limiter, store)
    }

    fn id(subject: &str) -> RateLimitIdentifier {
        RateLimitIdentifier::new(QuotaClass::Api).with(subject)
    }

    #[tokio::test]
    async fn test_admits_up_to_max_then_rejects() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let (limiter, _) = memory_limiter(clock.clone());
        let quota = QuotaConfig::new(60, 3);

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check_and_consume(&id("10.0.0.1"), &quota).await;
            assert!(decision.admitted);
            assert_eq!(decision.remaining, expected_remaining);
            assert_eq!(decision.reset_secs, 60);
            clock.advance(Duration::from_secs(1));
        }

        let decision = limiter.check_and_consume(&id("10.0.0.1"), &quota).await;
        assert!(!decision.admitted);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.limit, 3);
        // Oldest entry was recorded 3s ago, so it frees up in 57s
        assert_eq!(decision.reset_secs, 57);
    }

    #[tokio::test]
    async fn test_admits_again_after_window_elapses() {
        let clock = Arc::new(ManualClock::new(0));
        let (limiter, _) = memory_limiter(clock.clone());
        let quota = QuotaConfig::new(60, 2);

        assert!(limiter.check_and_consume(&id("a"), &quota).await.admitted);
        assert!(limiter.check_and_consume(&id("a"), &quota).await.admitted);
        assert!(!limiter.check_and_consume(&id("a"), &quota).await.admitted);

        clock.advance(Duration::from_secs(60));
        let decision = limiter.check_and_consume(&id("a"), &quota).await;
        assert!(decision.admitted);
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test]
    async fn test_window_boundary_is_exclusive() {
        let clock = Arc::new(ManualClock::new(0));
        let (limiter, store) = memory_limiter(clock.clone());
        let quota = QuotaConfig::new(60, 1);

        assert!(limiter.check_and_consume(&id("b"), &quota).await.admitted);

        // Exactly one interval later the t=0 entry no longer counts
        clock.set_millis(60_000);
        assert!(limiter.check_and_consume(&id("b"), &quota).await.admitted);

        clock.set_millis(121_000);
        let decision = limiter.check_and_consume(&id("b"), &quota).await;
        assert!(decision.admitted);
        assert_eq!(decision.remaining, 0);
        assert_eq!(store.cardinality("rate_limit:api:b").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_call_at_61_sees_no_entries_from_0() {
        let clock = Arc::new(ManualClock::new(0));
        let (limiter, store) = memory_limiter(clock.clone());
        let quota = QuotaConfig::new(60, 5);

        limiter.check_and_consume(&id("c"), &quota).await;
        clock.set_millis(61_000);
        let decision = limiter.check_and_consume(&id("c"), &quota).await;

        assert_eq!(decision.remaining, 4);
        let oldest = store.oldest("rate_limit:api:c").await.unwrap();
        assert_eq!(oldest.map(|(_, score)| score), Some(61_000));
    }

    #[tokio::test]
    async fn test_subjects_are_independent() {
        let clock = Arc::new(ManualClock::new(0));
        let (limiter, _) = memory_limiter(clock);
        let quota = QuotaConfig::new(60, 1);

        assert!(limiter.check_and_consume(&id("x"), &quota).await.admitted);
        assert!(!limiter.check_and_consume(&id("x"), &quota).await.admitted);
        assert!(limiter.check_and_consume(&id("y"), &quota).await.admitted);
    }

    #[tokio::test]
    async fn test_same_millisecond_requests_all_count() {
        let clock = Arc::new(ManualClock::new(5_000));
        let (limiter, _) = memory_limiter(clock);
        let quota = QuotaConfig::new(60, 3);

        for _ in 0..3 {
            assert!(limiter.check_and_consume(&id("z"), &quota).await.admitted);
        }
        assert!(!limiter.check_and_consume(&id("z"), &quota).await.admitted);
    }

    #[tokio::test]
    async fn test_unconfigured_fails_open() {
        let limiter = SlidingWindowLimiter::new(CounterBackend::Unconfigured);
        let quota = QuotaConfig::new(60, 1);

        for _ in 0..10 {
            let decision = limiter.check_and_consume(&id("d"), &quota).await;
            assert_eq!(decision, RateLimitDecision::fail_open(&quota));
        }
        assert!(!limiter.is_available());
        assert_eq!(limiter.health().await, StoreHealth::Unavailable);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_open() {
        let store = Arc::new(UnreachableStore {
            calls: AtomicUsize::new(0),
        });
        let limiter = SlidingWindowLimiter::new(CounterBackend::Available(store.clone()));
        let quota = QuotaConfig::new(60, 1);

        for _ in 0..10 {
            let decision = limiter.check_and_consume(&id("e"), &quota).await;
            assert!(decision.admitted);
            assert_eq!(decision.remaining, 1);
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 10);
        assert_eq!(limiter.health().await, StoreHealth::Unhealthy);
    }

    #[tokio::test]
    async fn test_custom_key_prefix() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(InMemoryCounterStore::with_clock(clock.clone()));
        let limiter =
            SlidingWindowLimiter::with_clock(CounterBackend::Available(store.clone()), clock)
                .with_key_prefix("rl:");

        limiter.check_and_consume(&id("f"), &QuotaConfig::new(60, 5)).await;
        assert_eq!(store.cardinality("rl:api:f").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reprobe_attaches_store() {
        let limiter = Arc::new(SlidingWindowLimiter::new(CounterBackend::Unconfigured));
        let handle = limiter.clone().spawn_reprobe(Duration::from_millis(10), || async {
            Ok::<_, StoreError>(Arc::new(InMemoryCounterStore::new()) as Arc<dyn CounterStore>)
        });

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(limiter.is_available());
        assert_eq!(limiter.health().await, StoreHealth::Healthy);
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(0), 0);
        assert_eq!(ceil_secs(1), 1);
        assert_eq!(ceil_secs(1_000), 1);
        assert_eq!(ceil_secs(1_001), 2);
        assert_eq!(ceil_secs(-5), 0);
    }
}
