//! The uniform cache contract and its store-backed facade.

use crate::error::{CacheError, CacheResult};
use crate::options::{InvalidateOptions, Options};
use crate::store::Store;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Contract shared by the facade and every decorator.
///
/// Decorators own an `Arc<dyn CacheInterface<V>>` and implement this trait
/// themselves, so layers stack in any order.
#[async_trait]
pub trait CacheInterface<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    /// Get a value.
    ///
    /// A missing key yields [`CacheError::NotFound`].
    async fn get(&self, key: &str) -> CacheResult<V>;

    /// Get a value together with its remaining TTL (`None` = no expiry).
    ///
    /// Layers that cannot report a TTL return [`CacheError::Unsupported`].
    async fn get_with_ttl(&self, key: &str) -> CacheResult<(V, Option<Duration>)>;

    /// Set a value. `None` options behave exactly like `Options::default()`.
    async fn set(&self, key: &str, value: V, options: Option<Options>) -> CacheResult<()>;

    /// Delete a key.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Delete every entry carrying one of the given tags.
    async fn invalidate(&self, options: InvalidateOptions) -> CacheResult<()>;

    /// Remove everything.
    async fn clear(&self) -> CacheResult<()>;

    /// Identifier of this layer (`"memory"`, `"redis"`, `"chain"`, ...).
    ///
    /// The facade reports its store's identifier so telemetry can tell
    /// backends apart.
    fn cache_type(&self) -> &'static str;
}

/// Cache facade over exactly one [`Store`].
///
/// Validates keys and forwards; no retries, no caching of its own.
///
/// # Examples
///
/// ```
/// use strata_cache::*;
/// use std::sync::Arc;
///
/// # async fn example() -> CacheResult<()> {
/// let cache = Cache::<String>::new(Arc::new(MemoryStore::<String>::new(CacheConfig::memory())));
///
/// cache.set("greeting", "hello".to_string(), None).await?;
/// assert_eq!(cache.get("greeting").await?, "hello");
/// # Ok(())
/// # }
/// ```
pub struct Cache<V>
where
    V: Send + Sync + 'static,
{
    store: Arc<dyn Store<V>>,
}

impl<V> Cache<V>
where
    V: Send + Sync + 'static,
{
    /// Wrap a store.
    pub fn new(store: Arc<dyn Store<V>>) -> Self {
        Self { store }
    }

    /// The wrapped store.
    pub fn store(&self) -> &Arc<dyn Store<V>> {
        &self.store
    }
}

impl<V> Clone for Cache<V>
where
    V: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

fn check_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}

#[async_trait]
impl<V> CacheInterface<V> for Cache<V>
where
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> CacheResult<V> {
        check_key(key)?;
        self.store.get(key).await
    }

    async fn get_with_ttl(&self, key: &str) -> CacheResult<(V, Option<Duration>)> {
        check_key(key)?;
        self.store.get_with_ttl(key).await
    }

    async fn set(&self, key: &str, value: V, options: Option<Options>) -> CacheResult<()> {
        check_key(key)?;
        let options = options.unwrap_or_default();
        self.store.set(key, value, &options).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        check_key(key)?;
        self.store.delete(key).await
    }

    async fn invalidate(&self, options: InvalidateOptions) -> CacheResult<()> {
        self.store.invalidate(&options).await
    }

    async fn clear(&self) -> CacheResult<()> {
        self.store.clear().await
    }

    fn cache_type(&self) -> &'static str {
        self.store.store_type()
    }
}

impl<V> std::fmt::Debug for Cache<V>
where
    V: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("store", &self.store.store_type())
            .finish()
    }
}
