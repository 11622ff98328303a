//! Metrics hooks for pool operations.
//!
//! Implement [`CacheMetrics`] to feed hits, misses and timings into your
//! monitoring system:
//!
//! ```
//! use cache_pool::observability::CacheMetrics;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use std::time::Duration;
//!
//! #[derive(Default)]
//! struct HitCounter {
//!     hits: AtomicU64,
//! }
//!
//! impl CacheMetrics for HitCounter {
//!     fn record_hit(&self, _key: &str, _duration: Duration) {
//!         self.hits.fetch_add(1, Ordering::Relaxed);
//!     }
//! }
//!
//! // let pool = CachePool::new(adapter).with_metrics(Box::new(HitCounter::default()));
//! ```
//!
//! Methods left unimplemented log through the `log` crate. Pools default to
//! [`NoOpMetrics`], which records nothing.

use std::time::Duration;

/// Trait for cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// Record a cache hit.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// Record a cache miss.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }

    /// Record a successful save.
    fn record_set(&self, key: &str, duration: Duration) {
        debug!("Cache SET: {} took {:?}", key, duration);
    }

    /// Record a successful delete.
    fn record_delete(&self, key: &str, duration: Duration) {
        debug!("Cache DELETE: {} took {:?}", key, duration);
    }

    /// Record a failed save, delete or clear. Clears use the key `*`.
    fn record_error(&self, key: &str, error: &str) {
        warn!("Cache ERROR for {}: {}", key, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
    fn record_set(&self, _key: &str, _duration: Duration) {}
    fn record_delete(&self, _key: &str, _duration: Duration) {}
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Metrics that only log, using the trait's default methods.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl CacheMetrics for LogMetrics {}
