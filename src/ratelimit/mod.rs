//! Sliding-window rate limiting over a shared counter store.

mod identifier;
mod limiter;
mod memory;
mod quota;
mod redis_store;
mod store;

pub use identifier::RateLimitIdentifier;
pub use limiter::{RateLimitDecision, SlidingWindowLimiter, StoreHealth};
pub use memory::InMemoryCounterStore;
pub use quota::{QuotaClass, QuotaConfig, QuotaTable};
pub use redis_store::RedisCounterStore;
pub use store::{CounterBackend, CounterStore, StoreError, StoreResult};
