//! Memcached store.
//!
//! The `memcache` client is blocking, so every call runs on the blocking
//! pool and is bounded by the operation timeout. Memcached cannot report a
//! key's remaining TTL; `get_with_ttl` is unsupported.
//!
//! Tag index entries are comma-joined member lists updated by
//! read-modify-write. Two concurrent tagged writes to the same tag can drop
//! one of the members; the affected key then simply isn't invalidated by
//! that tag and expires on its own TTL.

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::options::{InvalidateOptions, Options};
use crate::store::Store;
use crate::tags::{self, TagIndex, comma_list};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

/// Longest relative expiration Memcached accepts (30 days); anything longer
/// is sent as an absolute unix timestamp.
const MAX_RELATIVE_EXPIRATION: u64 = 60 * 60 * 24 * 30;

/// Memcached store.
#[derive(Clone)]
pub struct MemcachedStore {
    client: Arc<memcache::Client>,
    config: CacheConfig,
}

impl MemcachedStore {
    /// Connect to Memcached.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use strata_cache::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), CacheError> {
    ///     let config = CacheConfig::memcached("memcache://localhost:11211")?;
    ///     let store = MemcachedStore::new(config).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: CacheConfig) -> CacheResult<Self> {
        let url = config.url.clone();
        let io_timeout = config.operation_timeout;

        let connect = tokio::task::spawn_blocking(move || {
            let client = memcache::connect(url.as_str())?;
            client.set_read_timeout(Some(io_timeout))?;
            client.set_write_timeout(Some(io_timeout))?;
            Ok::<_, memcache::MemcacheError>(client)
        });

        let client = tokio::time::timeout(config.connection_timeout, connect)
            .await
            .map_err(|_| CacheError::Timeout)?
            .map_err(|e| CacheError::Connection(format!("Failed to spawn task: {}", e)))?
            .map_err(|e| CacheError::Connection(format!("Failed to connect: {}", e)))?;

        info!(url = %config.url, "Connected Memcached store");

        Ok(Self {
            client: Arc::new(client),
            config,
        })
    }

    /// Build the full key with prefix.
    fn build_key(&self, key: &str) -> String {
        self.config.build_key(key)
    }

    /// Run a client call on the blocking pool, bounded by the operation
    /// timeout.
    async fn call<T, F>(&self, op: F) -> CacheResult<T>
    where
        F: FnOnce(&memcache::Client) -> Result<T, memcache::MemcacheError> + Send + 'static,
        T: Send + 'static,
    {
        let client = self.client.clone();
        let task = tokio::task::spawn_blocking(move || op(&client));

        match tokio::time::timeout(self.config.operation_timeout, task).await {
            Ok(joined) => {
                let result =
                    joined.map_err(|e| CacheError::Other(format!("Task join error: {}", e)))?;
                Ok(result?)
            }
            Err(_) => Err(CacheError::Timeout),
        }
    }
}

/// Convert a TTL into Memcached's expiration field.
///
/// `0` means no expiry. Sub-second TTLs round up to one second, and TTLs
/// beyond 30 days become absolute timestamps.
fn expiration(ttl: Option<Duration>) -> u32 {
    let Some(ttl) = ttl else {
        return 0;
    };
    if ttl.is_zero() {
        return 0;
    }

    let secs = ttl.as_secs().max(1);
    if secs <= MAX_RELATIVE_EXPIRATION {
        return secs as u32;
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    u32::try_from(now.saturating_add(secs)).unwrap_or(u32::MAX)
}

#[async_trait]
impl Store<String> for MemcachedStore {
    async fn get(&self, key: &str) -> CacheResult<String> {
        let full_key = self.build_key(key);
        let value: Option<String> = self.call(move |client| client.get(&full_key)).await?;
        value.ok_or_else(|| CacheError::not_found(key))
    }

    async fn get_with_ttl(&self, _key: &str) -> CacheResult<(String, Option<Duration>)> {
        Err(CacheError::Unsupported {
            store: "memcached",
            operation: "get_with_ttl",
        })
    }

    async fn set(&self, key: &str, value: String, options: &Options) -> CacheResult<()> {
        let full_key = self.build_key(key);
        if !options.tags.is_empty() {
            comma_list::validate(&full_key)?;
        }
        let expiration = expiration(options.ttl(self.config.default_ttl));

        let write_key = full_key.clone();
        self.call(move |client| client.set(&write_key, value.as_str(), expiration))
            .await?;

        if !options.tags.is_empty() {
            tags::index_tags(self, &self.config, &full_key, options).await;
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let full_key = self.build_key(key);
        self.remove(&full_key).await
    }

    async fn invalidate(&self, options: &InvalidateOptions) -> CacheResult<()> {
        tags::invalidate_tags(self, &self.config, &options.tags).await
    }

    async fn clear(&self) -> CacheResult<()> {
        self.call(|client| client.flush()).await
    }

    fn store_type(&self) -> &'static str {
        "memcached"
    }
}

#[async_trait]
impl TagIndex for MemcachedStore {
    async fn members(&self, tag_key: &str) -> CacheResult<Vec<String>> {
        let tag_key = tag_key.to_string();
        let raw: Option<String> = self.call(move |client| client.get(&tag_key)).await?;
        Ok(raw.as_deref().map(comma_list::decode).unwrap_or_default())
    }

    async fn add_member(&self, tag_key: &str, member: &str, ttl: Duration) -> CacheResult<()> {
        comma_list::validate(member)?;
        let mut members = self.members(tag_key).await?;
        tags::append_member(&mut members, member);

        let tag_key = tag_key.to_string();
        let encoded = comma_list::encode(&members);
        let expiration = expiration(Some(ttl));
        self.call(move |client| client.set(&tag_key, encoded.as_str(), expiration))
            .await
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        let key = key.to_string();
        self.call(move |client| client.delete(&key)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiration_relative() {
        assert_eq!(expiration(None), 0);
        assert_eq!(expiration(Some(Duration::ZERO)), 0);
        assert_eq!(expiration(Some(Duration::from_millis(200))), 1);
        assert_eq!(expiration(Some(Duration::from_secs(60))), 60);
        assert_eq!(
            expiration(Some(Duration::from_secs(MAX_RELATIVE_EXPIRATION))),
            MAX_RELATIVE_EXPIRATION as u32
        );
    }

    #[test]
    fn test_expiration_absolute_beyond_thirty_days() {
        let ttl = Duration::from_secs(MAX_RELATIVE_EXPIRATION + 1);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let value = u64::from(expiration(Some(ttl)));
        assert!(value >= now + MAX_RELATIVE_EXPIRATION);
    }

    async fn live_store() -> MemcachedStore {
        let url = std::env::var("MEMCACHED_URL").unwrap_or_else(|_| "localhost:11211".to_string());
        let config = CacheConfig::memcached(url)
            .unwrap()
            .with_key_prefix("strata-test");
        MemcachedStore::new(config).await.unwrap()
    }

    #[tokio::test]
    #[ignore = "requires a running Memcached server"]
    async fn test_live_set_get_delete() {
        let store = live_store().await;

        store
            .set("k", "v".to_string(), &Options::default())
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), "v");
        assert!(matches!(
            store.get_with_ttl("k").await,
            Err(CacheError::Unsupported { .. })
        ));

        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    #[ignore = "requires a running Memcached server"]
    async fn test_live_tagged_key_with_delimiter_is_refused() {
        let store = live_store().await;

        let result = store
            .set("a,b", "v".to_string(), &Options::new().with_tags(["mc-comma"]))
            .await;
        assert!(matches!(result, Err(CacheError::InvalidKey(_))));
        assert!(store.get("a,b").await.unwrap_err().is_not_found());
        assert!(store
            .members("strata-test:gocache_tag_mc-comma")
            .await
            .unwrap()
            .is_empty());

        // Untagged writes don't touch the index
        store
            .set("a,b", "v".to_string(), &Options::default())
            .await
            .unwrap();
        store.delete("a,b").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running Memcached server"]
    async fn test_live_zero_expiration_never_expires() {
        let store = live_store().await;

        store
            .set(
                "zero",
                "v".to_string(),
                &Options::new().with_expiration(Duration::ZERO),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(store.get("zero").await.unwrap(), "v");
        store.delete("zero").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running Memcached server"]
    async fn test_live_tag_invalidation() {
        let store = live_store().await;
        let tagged = Options::new().with_tags(["mc-a"]);

        store.set("k1", "v".to_string(), &tagged).await.unwrap();
        store.set("k2", "v".to_string(), &tagged).await.unwrap();
        assert_eq!(
            store.members("strata-test:gocache_tag_mc-a").await.unwrap(),
            vec!["strata-test:k1", "strata-test:k2"]
        );

        store
            .invalidate(&InvalidateOptions::tags(["mc-a"]))
            .await
            .unwrap();
        assert!(store.get("k1").await.unwrap_err().is_not_found());
        assert!(store.get("k2").await.unwrap_err().is_not_found());
    }
}
