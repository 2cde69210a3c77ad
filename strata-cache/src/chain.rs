//! Multi-tier cache with read-through promotion.
//!
//! Tier 0 is the nearest (fastest) tier. A read walks the tiers in order and
//! copies a hit found at tier `i` into every tier before it, carrying the
//! remaining TTL reported by the hit tier. Writes fan out to every tier.

use crate::cache::CacheInterface;
use crate::error::{CacheError, CacheResult};
use crate::options::{InvalidateOptions, Options};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Ordered chain of caches.
///
/// # Examples
///
/// ```
/// use strata_cache::*;
/// use std::sync::Arc;
///
/// # async fn example() -> CacheResult<()> {
/// let near: Arc<dyn CacheInterface<String>> =
///     Arc::new(Cache::<String>::new(Arc::new(MemoryStore::<String>::new(CacheConfig::memory()))));
/// let far: Arc<dyn CacheInterface<String>> =
///     Arc::new(Cache::<String>::new(Arc::new(MemoryStore::<String>::new(CacheConfig::memory()))));
///
/// far.set("k", "v".to_string(), None).await?;
///
/// let chain = ChainCache::new(vec![near.clone(), far]);
/// assert_eq!(chain.get("k").await?, "v");
/// assert_eq!(near.get("k").await?, "v");
/// # Ok(())
/// # }
/// ```
pub struct ChainCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    tiers: Vec<Arc<dyn CacheInterface<V>>>,
}

impl<V> ChainCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a chain, nearest tier first.
    pub fn new(tiers: Vec<Arc<dyn CacheInterface<V>>>) -> Self {
        Self { tiers }
    }

    /// The tiers, nearest first.
    pub fn tiers(&self) -> &[Arc<dyn CacheInterface<V>>] {
        &self.tiers
    }

    /// Read one tier, preferring a TTL-aware read.
    async fn read_tier(
        tier: &dyn CacheInterface<V>,
        key: &str,
    ) -> CacheResult<(V, Option<Duration>)> {
        match tier.get_with_ttl(key).await {
            Err(CacheError::Unsupported { .. }) => tier.get(key).await.map(|value| (value, None)),
            other => other,
        }
    }

    /// Copy a hit into the tiers nearer than `hit_index`. Failures are logged.
    async fn promote(&self, key: &str, value: &V, ttl: Option<Duration>, hit_index: usize) {
        let options = Options {
            expiration: ttl,
            ..Options::default()
        };

        for (index, tier) in self.tiers[..hit_index].iter().enumerate() {
            match tier.set(key, value.clone(), Some(options.clone())).await {
                Ok(()) => debug!(key = %key, from = hit_index, to = index, "Promoted cache entry"),
                Err(e) => warn!(
                    key = %key,
                    tier = tier.cache_type(),
                    error = %e,
                    "Failed to promote cache entry"
                ),
            }
        }
    }

    /// Walk the tiers; without a hit, the farthest tier's error is returned.
    async fn lookup(&self, key: &str) -> CacheResult<(V, Option<Duration>)> {
        let mut last_error = None;

        for (index, tier) in self.tiers.iter().enumerate() {
            match Self::read_tier(&**tier, key).await {
                Ok((value, ttl)) => {
                    let expiring = ttl.is_some_and(|ttl| ttl.is_zero());
                    if index > 0 && !expiring {
                        self.promote(key, &value, ttl, index).await;
                    }
                    return Ok((value, ttl));
                }
                Err(e) => {
                    if !e.is_not_found() {
                        debug!(key = %key, tier = index, error = %e, "Tier read failed, trying next");
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CacheError::not_found(key)))
    }
}

#[async_trait]
impl<V> CacheInterface<V> for ChainCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> CacheResult<V> {
        self.lookup(key).await.map(|(value, _)| value)
    }

    async fn get_with_ttl(&self, key: &str) -> CacheResult<(V, Option<Duration>)> {
        self.lookup(key).await
    }

    async fn set(&self, key: &str, value: V, options: Option<Options>) -> CacheResult<()> {
        let mut failures = Vec::new();
        for tier in &self.tiers {
            if let Err(e) = tier.set(key, value.clone(), options.clone()).await {
                warn!(key = %key, tier = tier.cache_type(), error = %e, "Chain set failed on tier");
                failures.push(e);
            }
        }
        CacheError::from_failures("set", failures)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut failures = Vec::new();
        for tier in &self.tiers {
            if let Err(e) = tier.delete(key).await {
                failures.push(e);
            }
        }
        CacheError::from_failures("delete", failures)
    }

    async fn invalidate(&self, options: InvalidateOptions) -> CacheResult<()> {
        let mut failures = Vec::new();
        for tier in &self.tiers {
            if let Err(e) = tier.invalidate(options.clone()).await {
                failures.push(e);
            }
        }
        CacheError::from_failures("invalidate", failures)
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut failures = Vec::new();
        for tier in &self.tiers {
            if let Err(e) = tier.clear().await {
                failures.push(e);
            }
        }
        CacheError::from_failures("clear", failures)
    }

    fn cache_type(&self) -> &'static str {
        "chain"
    }
}
