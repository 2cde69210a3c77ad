//! Counting decorator and the exporter seam.

use crate::cache::CacheInterface;
use crate::error::CacheResult;
use crate::options::{InvalidateOptions, Options};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Operation counters of one cache instance.
#[derive(Debug, Default)]
pub struct Stats {
    hits: AtomicU64,
    miss: AtomicU64,
    set_success: AtomicU64,
    set_error: AtomicU64,
    delete_success: AtomicU64,
    delete_error: AtomicU64,
    invalidate_success: AtomicU64,
    invalidate_error: AtomicU64,
    clear_success: AtomicU64,
    clear_error: AtomicU64,
}

impl Stats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            miss: self.miss.load(Ordering::Relaxed),
            set_success: self.set_success.load(Ordering::Relaxed),
            set_error: self.set_error.load(Ordering::Relaxed),
            delete_success: self.delete_success.load(Ordering::Relaxed),
            delete_error: self.delete_error.load(Ordering::Relaxed),
            invalidate_success: self.invalidate_success.load(Ordering::Relaxed),
            invalidate_error: self.invalidate_error.load(Ordering::Relaxed),
            clear_success: self.clear_success.load(Ordering::Relaxed),
            clear_error: self.clear_error.load(Ordering::Relaxed),
        }
    }

    fn bump<T>(result: &CacheResult<T>, success: &AtomicU64, failure: &AtomicU64) {
        let counter = if result.is_ok() { success } else { failure };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Counter values at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub miss: u64,
    pub set_success: u64,
    pub set_error: u64,
    pub delete_success: u64,
    pub delete_error: u64,
    pub invalidate_success: u64,
    pub invalidate_error: u64,
    pub clear_success: u64,
    pub clear_error: u64,
}

impl StatsSnapshot {
    /// `(name, value)` pairs, in a stable order.
    pub fn metrics(&self) -> [(&'static str, u64); 10] {
        [
            ("hit_count", self.hits),
            ("miss_count", self.miss),
            ("set_success", self.set_success),
            ("set_error", self.set_error),
            ("delete_success", self.delete_success),
            ("delete_error", self.delete_error),
            ("invalidate_success", self.invalidate_success),
            ("invalidate_error", self.invalidate_error),
            ("clear_success", self.clear_success),
            ("clear_error", self.clear_error),
        ]
    }

    /// Hit ratio in `[0, 1]`; `0` before any read.
    pub fn hit_ratio(&self) -> f64 {
        let reads = self.hits + self.miss;
        if reads == 0 {
            0.0
        } else {
            self.hits as f64 / reads as f64
        }
    }
}

/// Receives counter snapshots after every decorated call.
pub trait MetricsRecorder: Send + Sync {
    /// Record the current counters of the cache identified by `cache_type`.
    fn record(&self, cache_type: &str, stats: &StatsSnapshot);
}

/// Cache decorator counting every call.
///
/// Each call bumps exactly one counter (success xor failure; hit xor miss
/// for reads) and returns the inner result untouched. Misses and read
/// errors both count as misses.
///
/// # Examples
///
/// ```
/// use strata_cache::*;
/// use std::sync::Arc;
///
/// # async fn example() -> CacheResult<()> {
/// let inner: Arc<dyn CacheInterface<String>> =
///     Arc::new(Cache::<String>::new(Arc::new(MemoryStore::<String>::new(CacheConfig::memory()))));
/// let cache = MetricCache::new(inner);
///
/// cache.set("k", "v".to_string(), None).await?;
/// cache.get("k").await?;
/// let _ = cache.get("missing").await;
///
/// let stats = cache.stats();
/// assert_eq!((stats.hits, stats.miss, stats.set_success), (1, 1, 1));
/// # Ok(())
/// # }
/// ```
pub struct MetricCache<V>
where
    V: Send + Sync + 'static,
{
    inner: Arc<dyn CacheInterface<V>>,
    stats: Stats,
    recorder: Option<Arc<dyn MetricsRecorder>>,
}

impl<V> MetricCache<V>
where
    V: Send + Sync + 'static,
{
    /// Count calls without exporting.
    pub fn new(inner: Arc<dyn CacheInterface<V>>) -> Self {
        Self {
            inner,
            stats: Stats::new(),
            recorder: None,
        }
    }

    /// Count calls and hand a snapshot to `recorder` after each one.
    pub fn with_recorder(inner: Arc<dyn CacheInterface<V>>, recorder: Arc<dyn MetricsRecorder>) -> Self {
        Self {
            inner,
            stats: Stats::new(),
            recorder: Some(recorder),
        }
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn publish(&self) {
        if let Some(recorder) = &self.recorder {
            recorder.record(self.inner.cache_type(), &self.stats.snapshot());
        }
    }
}

#[async_trait]
impl<V> CacheInterface<V> for MetricCache<V>
where
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> CacheResult<V> {
        let result = self.inner.get(key).await;
        Stats::bump(&result, &self.stats.hits, &self.stats.miss);
        self.publish();
        result
    }

    async fn get_with_ttl(&self, key: &str) -> CacheResult<(V, Option<Duration>)> {
        let result = self.inner.get_with_ttl(key).await;
        Stats::bump(&result, &self.stats.hits, &self.stats.miss);
        self.publish();
        result
    }

    async fn set(&self, key: &str, value: V, options: Option<Options>) -> CacheResult<()> {
        let result = self.inner.set(key, value, options).await;
        Stats::bump(&result, &self.stats.set_success, &self.stats.set_error);
        self.publish();
        result
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let result = self.inner.delete(key).await;
        Stats::bump(&result, &self.stats.delete_success, &self.stats.delete_error);
        self.publish();
        result
    }

    async fn invalidate(&self, options: InvalidateOptions) -> CacheResult<()> {
        let result = self.inner.invalidate(options).await;
        Stats::bump(
            &result,
            &self.stats.invalidate_success,
            &self.stats.invalidate_error,
        );
        self.publish();
        result
    }

    async fn clear(&self) -> CacheResult<()> {
        let result = self.inner.clear().await;
        Stats::bump(&result, &self.stats.clear_success, &self.stats.clear_error);
        self.publish();
        result
    }

    fn cache_type(&self) -> &'static str {
        "metric"
    }
}
