//! In-process store built on moka.
//!
//! Entries are weighted by [`Options::cost`] against
//! [`CacheConfig::max_capacity`], and each entry carries its own TTL. An entry
//! heavier than the whole capacity is refused.
//! Tag index entries live in the same cache as an ordered member list and
//! are extended with moka's atomic per-key upsert, so concurrent tagged
//! writes never lose members.

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::options::{InvalidateOptions, Options};
use crate::store::Store;
use crate::tags::{self, TagIndex};
use crate::watch::{EventKind, StoreEvent, Watcher};
use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use moka::notification::RemovalCause;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// What a cache slot holds.
#[derive(Clone)]
enum Slot<V> {
    Value {
        value: V,
        ttl: Option<Duration>,
        expires_at: Option<Instant>,
        weight: u32,
    },
    Tag {
        members: Vec<String>,
        ttl: Duration,
    },
}

impl<V> Slot<V> {
    fn ttl(&self) -> Option<Duration> {
        match self {
            Slot::Value { ttl, .. } => *ttl,
            Slot::Tag { ttl, .. } => Some(*ttl),
        }
    }

    fn weight(&self) -> u32 {
        match self {
            Slot::Value { weight, .. } => *weight,
            Slot::Tag { .. } => 1,
        }
    }
}

/// Per-entry expiration: every insert or update restarts the slot's own TTL.
struct SlotExpiry;

impl<V> Expiry<String, Slot<V>> for SlotExpiry {
    fn expire_after_create(&self, _key: &String, slot: &Slot<V>, _created_at: Instant) -> Option<Duration> {
        slot.ttl()
    }

    fn expire_after_update(
        &self,
        _key: &String,
        slot: &Slot<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        slot.ttl()
    }
}

/// In-memory store.
///
/// # Examples
///
/// ```
/// use strata_cache::*;
///
/// # async fn example() -> CacheResult<()> {
/// let store = MemoryStore::<String>::new(CacheConfig::memory());
/// store
///     .set("user:1", "Alice".to_string(), &Options::new().with_tags(["users"]))
///     .await?;
///
/// store.invalidate(&InvalidateOptions::tags(["users"])).await?;
/// assert!(store.get("user:1").await.unwrap_err().is_not_found());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    cache: Cache<String, Slot<V>>,
    config: CacheConfig,
    watcher: Option<Arc<Watcher>>,
}

impl<V> MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a new in-memory store.
    pub fn new(config: CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .weigher(|_key: &String, slot: &Slot<V>| slot.weight())
            .expire_after(SlotExpiry)
            .build();

        Self {
            cache,
            config,
            watcher: None,
        }
    }

    /// Create an in-memory store that reports removals and overwrites of
    /// data entries through a [`Watcher`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_watch(config: CacheConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let keys = config.clone();

        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .weigher(|_key: &String, slot: &Slot<V>| slot.weight())
            .expire_after(SlotExpiry)
            .eviction_listener(move |key: Arc<String>, slot: Slot<V>, cause: RemovalCause| {
                let Slot::Value { .. } = slot else {
                    return;
                };
                let Some(key) = keys.caller_key(key.as_str()) else {
                    return;
                };
                let kind = match cause {
                    RemovalCause::Expired => EventKind::Expired,
                    RemovalCause::Explicit => EventKind::Deleted,
                    RemovalCause::Replaced => EventKind::Set,
                    RemovalCause::Size => EventKind::Evicted,
                };
                let _ = tx.send(StoreEvent::new(key, kind));
            })
            .build();

        Self {
            cache,
            config,
            watcher: Some(Arc::new(Watcher::spawn(UnboundedReceiverStream::new(rx)))),
        }
    }

    /// The change watcher, when created with [`MemoryStore::with_watch`].
    pub fn watcher(&self) -> Option<&Watcher> {
        self.watcher.as_deref()
    }

    /// Stop the watch loop, if any.
    pub async fn shutdown(&self) {
        if let Some(watcher) = &self.watcher {
            watcher.shutdown().await;
        }
    }

    /// Approximate number of slots, tag index entries included.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Apply pending admission, eviction and expiration work.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    fn build_key(&self, key: &str) -> String {
        self.config.build_key(key)
    }
}

#[async_trait]
impl<V> Store<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> CacheResult<V> {
        self.get_with_ttl(key).await.map(|(value, _)| value)
    }

    async fn get_with_ttl(&self, key: &str) -> CacheResult<(V, Option<Duration>)> {
        match self.cache.get(self.build_key(key).as_str()).await {
            Some(Slot::Value {
                value, expires_at, ..
            }) => {
                let remaining =
                    expires_at.map(|at| at.saturating_duration_since(Instant::now()));
                Ok((value, remaining))
            }
            _ => Err(CacheError::not_found(key)),
        }
    }

    async fn set(&self, key: &str, value: V, options: &Options) -> CacheResult<()> {
        let weight = options.weight();
        if u64::from(weight) > self.config.max_capacity {
            return Err(CacheError::Rejected(format!(
                "{} has cost {} above capacity {}",
                key, weight, self.config.max_capacity
            )));
        }

        let key = self.build_key(key);
        let ttl = options.ttl(self.config.default_ttl);

        let slot = Slot::Value {
            value,
            ttl,
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
            weight,
        };
        self.cache.insert(key.clone(), slot).await;

        if options.synchronous {
            self.cache.run_pending_tasks().await;
        }

        if !options.tags.is_empty() {
            tags::index_tags(self, &self.config, &key, options).await;
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.cache.invalidate(self.build_key(key).as_str()).await;
        Ok(())
    }

    async fn invalidate(&self, options: &InvalidateOptions) -> CacheResult<()> {
        tags::invalidate_tags(self, &self.config, &options.tags).await
    }

    async fn clear(&self) -> CacheResult<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl<V> TagIndex for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn members(&self, tag_key: &str) -> CacheResult<Vec<String>> {
        match self.cache.get(tag_key).await {
            Some(Slot::Tag { members, .. }) => Ok(members),
            _ => Ok(Vec::new()),
        }
    }

    async fn add_member(&self, tag_key: &str, member: &str, ttl: Duration) -> CacheResult<()> {
        self.cache
            .entry(tag_key.to_string())
            .and_upsert_with(|existing| {
                let mut members = match existing.map(|entry| entry.into_value()) {
                    Some(Slot::Tag { members, .. }) => members,
                    _ => Vec::new(),
                };
                tags::append_member(&mut members, member);
                std::future::ready(Slot::Tag { members, ttl })
            })
            .await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore<String> {
        MemoryStore::new(CacheConfig::memory())
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = store();

        store
            .set("key", "value".to_string(), &Options::default())
            .await
            .unwrap();
        assert_eq!(store.get("key").await.unwrap(), "value");

        store.delete("key").await.unwrap();
        assert!(store.get("key").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_get_with_ttl() {
        let store = store();

        store
            .set(
                "short",
                "v".to_string(),
                &Options::new().with_expiration(Duration::from_secs(60)),
            )
            .await
            .unwrap();
        store
            .set("forever", "v".to_string(), &Options::default())
            .await
            .unwrap();

        let (_, ttl) = store.get_with_ttl("short").await.unwrap();
        let ttl = ttl.unwrap();
        assert!(ttl <= Duration::from_secs(60));
        assert!(ttl > Duration::from_secs(55));

        let (_, ttl) = store.get_with_ttl("forever").await.unwrap();
        assert!(ttl.is_none());
    }

    #[tokio::test]
    async fn test_default_ttl_applies() {
        let store: MemoryStore<String> =
            MemoryStore::new(CacheConfig::memory().with_default_ttl(Duration::from_secs(30)));

        store
            .set("key", "v".to_string(), &Options::default())
            .await
            .unwrap();

        let (_, ttl) = store.get_with_ttl("key").await.unwrap();
        assert!(ttl.unwrap() <= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let store = store();

        store
            .set(
                "key",
                "v".to_string(),
                &Options::new().with_expiration(Duration::from_millis(50)),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.get("key").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_zero_expiration_never_expires() {
        let store: MemoryStore<String> =
            MemoryStore::new(CacheConfig::memory().with_default_ttl(Duration::from_millis(50)));

        store
            .set(
                "key",
                "v".to_string(),
                &Options::new().with_expiration(Duration::ZERO),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let (value, ttl) = store.get_with_ttl("key").await.unwrap();
        assert_eq!(value, "v");
        assert!(ttl.is_none());
    }

    #[tokio::test]
    async fn test_cost_counts_against_capacity() {
        let store: MemoryStore<String> =
            MemoryStore::new(CacheConfig::memory().with_max_capacity(10));
        let heavy = Options::new().with_cost(6).with_synchronous(true);

        store.set("a", "v".to_string(), &heavy).await.unwrap();
        store.set("b", "v".to_string(), &heavy).await.unwrap();
        store.run_pending_tasks().await;

        let present = [store.get("a").await, store.get("b").await]
            .iter()
            .filter(|result| result.is_ok())
            .count();
        assert_eq!(present, 1);
        assert!(store.cache.weighted_size() <= 10);
    }

    #[tokio::test]
    async fn test_entry_heavier_than_capacity_is_rejected() {
        let store: MemoryStore<String> =
            MemoryStore::new(CacheConfig::memory().with_max_capacity(10));

        let result = store
            .set(
                "big",
                "v".to_string(),
                &Options::new().with_cost(50).with_synchronous(true),
            )
            .await;
        assert!(matches!(result, Err(CacheError::Rejected(_))));
        assert!(store.get("big").await.unwrap_err().is_not_found());

        // At capacity is still admitted
        store
            .set(
                "fits",
                "v".to_string(),
                &Options::new().with_cost(10).with_synchronous(true),
            )
            .await
            .unwrap();
        assert_eq!(store.get("fits").await.unwrap(), "v");
    }

    #[tokio::test]
    async fn test_tag_entry_ttl_default_and_override() {
        let store = store();

        store
            .set("k", "v".to_string(), &Options::new().with_tags(["default"]))
            .await
            .unwrap();
        store
            .set(
                "k",
                "v".to_string(),
                &Options::new()
                    .with_tags(["custom"])
                    .with_tags_ttl(Duration::from_secs(60)),
            )
            .await
            .unwrap();

        let tag_ttl = |slot: Option<Slot<String>>| match slot {
            Some(Slot::Tag { ttl, .. }) => Some(ttl),
            _ => None,
        };
        assert_eq!(
            tag_ttl(store.cache.get("gocache_tag_default").await),
            Some(tags::DEFAULT_TAG_TTL)
        );
        assert_eq!(
            tag_ttl(store.cache.get("gocache_tag_custom").await),
            Some(Duration::from_secs(60))
        );
    }

    #[tokio::test]
    async fn test_tag_entry_expires_independently() {
        let store = store();

        store
            .set(
                "k",
                "v".to_string(),
                &Options::new()
                    .with_tags(["short"])
                    .with_tags_ttl(Duration::from_millis(50)),
            )
            .await
            .unwrap();
        assert_eq!(store.members("gocache_tag_short").await.unwrap(), vec!["k"]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.members("gocache_tag_short").await.unwrap().is_empty());
        assert_eq!(store.get("k").await.unwrap(), "v");
    }

    #[tokio::test]
    async fn test_tag_invalidation() {
        let store = store();
        let tagged = Options::new().with_tags(["a", "b"]);

        store.set("k1", "v1".to_string(), &tagged).await.unwrap();
        store
            .set("k2", "v2".to_string(), &Options::new().with_tags(["a"]))
            .await
            .unwrap();
        store
            .set("k3", "v3".to_string(), &Options::default())
            .await
            .unwrap();

        assert_eq!(
            store.members("gocache_tag_a").await.unwrap(),
            vec!["k1".to_string(), "k2".to_string()]
        );

        store
            .invalidate(&InvalidateOptions::tags(["a"]))
            .await
            .unwrap();

        assert!(store.get("k1").await.unwrap_err().is_not_found());
        assert!(store.get("k2").await.unwrap_err().is_not_found());
        assert_eq!(store.get("k3").await.unwrap(), "v3");
        assert!(store.members("gocache_tag_a").await.unwrap().is_empty());

        // "b" still lists k1, which is already gone
        assert_eq!(store.members("gocache_tag_b").await.unwrap(), vec!["k1"]);
        store
            .invalidate(&InvalidateOptions::tags(["b"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_tag_index_is_not_readable_as_value() {
        let store = store();
        store
            .set("k", "v".to_string(), &Options::new().with_tags(["t"]))
            .await
            .unwrap();

        assert!(store.get("gocache_tag_t").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_concurrent_tagged_writes_keep_all_members() {
        let store = store();

        let writes = (0..50).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .set(
                        &format!("key:{}", i),
                        "v".to_string(),
                        &Options::new().with_tags(["shared"]),
                    )
                    .await
            })
        });
        for result in futures::future::join_all(writes).await {
            result.unwrap().unwrap();
        }

        assert_eq!(store.members("gocache_tag_shared").await.unwrap().len(), 50);
    }

    #[tokio::test]
    async fn test_key_prefix() {
        let store: MemoryStore<String> =
            MemoryStore::new(CacheConfig::memory().with_key_prefix("app"));

        store
            .set("k", "v".to_string(), &Options::new().with_tags(["t"]))
            .await
            .unwrap();

        assert_eq!(store.members("app:gocache_tag_t").await.unwrap(), vec!["app:k"]);

        store
            .invalidate(&InvalidateOptions::tags(["t"]))
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = store();
        store
            .set("k1", "v".to_string(), &Options::new().with_synchronous(true))
            .await
            .unwrap();
        store
            .set("k2", "v".to_string(), &Options::default())
            .await
            .unwrap();

        store.clear().await.unwrap();

        assert!(store.get("k1").await.unwrap_err().is_not_found());
        assert!(store.get("k2").await.unwrap_err().is_not_found());
        assert_eq!(store.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_watch_reports_deletes() {
        let store: MemoryStore<String> = MemoryStore::with_watch(CacheConfig::memory());
        let (tx, mut rx) = mpsc::unbounded_channel();
        store.watcher().unwrap().on_event(move |event| {
            let _ = tx.send(event.clone());
        });

        store
            .set("k", "v".to_string(), &Options::default())
            .await
            .unwrap();
        store.delete("k").await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, StoreEvent::new("k", EventKind::Deleted));

        store.shutdown().await;
        assert!(!store.watcher().unwrap().is_running());
    }

    #[tokio::test]
    async fn test_watch_reports_caller_keys() {
        let store: MemoryStore<String> =
            MemoryStore::with_watch(CacheConfig::memory().with_key_prefix("app"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        store.watcher().unwrap().on_event(move |event| {
            let _ = tx.send(event.clone());
        });

        store
            .set("k", "v".to_string(), &Options::new().with_tags(["t"]))
            .await
            .unwrap();
        store
            .invalidate(&InvalidateOptions::tags(["t"]))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, StoreEvent::new("k", EventKind::Deleted));

        store.shutdown().await;
    }

    #[test]
    fn test_store_type() {
        assert_eq!(store().store_type(), "memory");
    }
}
