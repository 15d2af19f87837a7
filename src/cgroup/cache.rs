use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A metric value that is re-read from the controller at most once per timeout.
///
/// The value is published before its deadline, so a reader that sees an
/// unexpired deadline also sees the value stored with it. Concurrent readers
/// may still refresh twice.
#[derive(Debug)]
pub struct CachedMetric {
    value: AtomicI64,
    /// Nanoseconds since `epoch` after which the value is stale.
    next_check: AtomicU64,
    epoch: Instant,
}

/// Held by `value` until the first [`CachedMetric::set_value`].
const NO_VALUE: i64 = i64::MIN;

impl CachedMetric {
    pub fn new() -> Self {
        Self {
            value: AtomicI64::new(NO_VALUE),
            next_check: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    fn now(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Whether the cached value has expired (or was never set).
    pub fn should_check_metric(&self) -> bool {
        self.now() >= self.next_check.load(Ordering::Acquire)
    }

    /// The cached value, `None` before the first [`CachedMetric::set_value`].
    pub fn value(&self) -> Option<i64> {
        match self.value.load(Ordering::Acquire) {
            NO_VALUE => None,
            value => Some(value),
        }
    }

    /// Stores `value` and keeps it for `timeout`.
    pub fn set_value(&self, value: i64, timeout: Duration) {
        let timeout = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        self.value.store(value, Ordering::Release);
        self.next_check
            .store(self.now().saturating_add(timeout), Ordering::Release);
    }
}

impl Default for CachedMetric {
    fn default() -> Self {
        Self::new()
    }
}

/// A controller paired with the cache of its most expensive metric.
#[derive(Debug)]
pub struct CachingController<T> {
    controller: T,
    metrics_cache: CachedMetric,
}

impl<T> CachingController<T> {
    pub fn new(controller: T) -> Self {
        Self {
            controller,
            metrics_cache: CachedMetric::new(),
        }
    }

    pub fn controller(&self) -> &T {
        &self.controller
    }

    pub fn metrics_cache(&self) -> &CachedMetric {
        &self.metrics_cache
    }

    /// Returns the cached value, or computes, stores and returns a fresh one.
    pub fn cached_or_refresh(&self, timeout: Duration, refresh: impl FnOnce(&T) -> i64) -> i64 {
        if !self.metrics_cache.should_check_metric() {
            if let Some(value) = self.metrics_cache.value() {
                return value;
            }
        }
        let value = refresh(&self.controller);
        self.metrics_cache.set_value(value, timeout);
        value
    }
}
