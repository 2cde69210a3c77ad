//! Typed access over byte or string caches.

use crate::cache::CacheInterface;
use crate::error::{CacheError, CacheResult};
use crate::options::{InvalidateOptions, Options};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Duration;

/// Value types a [`Marshaler`] can encode into.
pub trait MarshalValue: Send + Sync + Sized + 'static {
    /// Wrap encoded bytes.
    fn from_bytes(bytes: Vec<u8>) -> CacheResult<Self>;

    /// Borrow the encoded bytes.
    fn as_bytes(&self) -> &[u8];
}

impl MarshalValue for Vec<u8> {
    fn from_bytes(bytes: Vec<u8>) -> CacheResult<Self> {
        Ok(bytes)
    }

    fn as_bytes(&self) -> &[u8] {
        self
    }
}

impl MarshalValue for String {
    fn from_bytes(bytes: Vec<u8>) -> CacheResult<Self> {
        String::from_utf8(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn as_bytes(&self) -> &[u8] {
        str::as_bytes(self)
    }
}

/// JSON-encoding front for a cache holding bytes or strings.
///
/// A value that fails to decode into the requested type is a
/// [`CacheError::Deserialization`], never a miss.
///
/// # Examples
///
/// ```
/// use strata_cache::*;
/// use serde::{Deserialize, Serialize};
/// use std::sync::Arc;
///
/// #[derive(Serialize, Deserialize, PartialEq, Debug)]
/// struct Book {
///     title: String,
/// }
///
/// # async fn example() -> CacheResult<()> {
/// let cache: Arc<dyn CacheInterface<Vec<u8>>> =
///     Arc::new(Cache::<Vec<u8>>::new(Arc::new(MemoryStore::<Vec<u8>>::new(CacheConfig::memory()))));
/// let marshal = Marshaler::new(cache);
///
/// let book = Book { title: "Dune".to_string() };
/// marshal.set("book:1", &book, Some(Options::new().with_tags(["books"]))).await?;
///
/// let cached: Book = marshal.get("book:1").await?;
/// assert_eq!(cached, book);
/// # Ok(())
/// # }
/// ```
pub struct Marshaler<V>
where
    V: MarshalValue,
{
    cache: Arc<dyn CacheInterface<V>>,
}

impl<V> Marshaler<V>
where
    V: MarshalValue,
{
    /// Wrap a cache.
    pub fn new(cache: Arc<dyn CacheInterface<V>>) -> Self {
        Self { cache }
    }

    /// The wrapped cache.
    pub fn cache(&self) -> &Arc<dyn CacheInterface<V>> {
        &self.cache
    }

    /// Get a value and decode it as `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<T> {
        let raw = self.cache.get(key).await?;
        decode(&raw)
    }

    /// Get a value decoded as `T`, with its remaining TTL.
    pub async fn get_with_ttl<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> CacheResult<(T, Option<Duration>)> {
        let (raw, ttl) = self.cache.get_with_ttl(key).await?;
        Ok((decode(&raw)?, ttl))
    }

    /// Encode `value` and store it.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: Option<Options>,
    ) -> CacheResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.cache.set(key, V::from_bytes(bytes)?, options).await
    }

    /// Get a value, or produce it with `loader` and store it on a miss.
    ///
    /// Only a miss triggers the loader; transport and decode errors are
    /// returned as they are.
    pub async fn get_or_load<T, F, Fut>(
        &self,
        key: &str,
        options: Option<Options>,
        loader: F,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = CacheResult<T>>,
    {
        match self.get(key).await {
            Err(e) if e.is_not_found() => {}
            other => return other,
        }

        let value = loader().await?;
        self.set(key, &value, options).await?;
        Ok(value)
    }

    /// Delete a key.
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.cache.delete(key).await
    }

    /// Delete every entry carrying one of the given tags.
    pub async fn invalidate(&self, options: InvalidateOptions) -> CacheResult<()> {
        self.cache.invalidate(options).await
    }

    /// Remove everything.
    pub async fn clear(&self) -> CacheResult<()> {
        self.cache.clear().await
    }
}

fn decode<V: MarshalValue, T: DeserializeOwned>(raw: &V) -> CacheResult<T> {
    serde_json::from_slice(raw.as_bytes()).map_err(|e| CacheError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::config::CacheConfig;
    use crate::stores::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Book {
        title: String,
        pages: u32,
    }

    fn byte_cache() -> Arc<dyn CacheInterface<Vec<u8>>> {
        Arc::new(Cache::<Vec<u8>>::new(Arc::new(MemoryStore::<Vec<u8>>::new(
            CacheConfig::memory(),
        ))))
    }

    fn string_cache() -> Arc<dyn CacheInterface<String>> {
        Arc::new(Cache::<String>::new(Arc::new(MemoryStore::<String>::new(
            CacheConfig::memory(),
        ))))
    }

    #[tokio::test]
    async fn test_typed_set_get_over_bytes() {
        let marshal = Marshaler::new(byte_cache());
        let book = Book {
            title: "Dune".to_string(),
            pages: 412,
        };

        marshal.set("book", &book, None).await.unwrap();
        assert_eq!(marshal.get::<Book>("book").await.unwrap(), book);
    }

    #[tokio::test]
    async fn test_typed_set_get_over_strings() {
        let cache = string_cache();
        let marshal = Marshaler::new(cache.clone());

        marshal.set("n", &42u64, None).await.unwrap();
        assert_eq!(cache.get("n").await.unwrap(), "42");
        assert_eq!(marshal.get::<u64>("n").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_decode_failure_is_deserialization_error() {
        let cache = string_cache();
        cache.set("k", "not json".to_string(), None).await.unwrap();

        let marshal = Marshaler::new(cache);
        let err = marshal.get::<Book>("k").await.unwrap_err();
        assert!(matches!(err, CacheError::Deserialization(_)));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let marshal = Marshaler::new(byte_cache());
        assert!(marshal.get::<Book>("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_tagged_invalidation() {
        let marshal = Marshaler::new(byte_cache());
        let book = Book {
            title: "t".to_string(),
            pages: 1,
        };

        marshal
            .set("key", &book, Some(Options::new().with_tags(["a", "b"])))
            .await
            .unwrap();
        marshal
            .invalidate(InvalidateOptions::tags(["a"]))
            .await
            .unwrap();
        assert!(marshal.get::<Book>("key").await.unwrap_err().is_not_found());

        marshal
            .invalidate(InvalidateOptions::tags(["c"]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_or_load() {
        let marshal = Marshaler::new(byte_cache());

        let loaded: Book = marshal
            .get_or_load("book", None, || async {
                Ok(Book {
                    title: "Loaded".to_string(),
                    pages: 7,
                })
            })
            .await
            .unwrap();
        assert_eq!(loaded.title, "Loaded");

        // Second call is served from the cache
        let cached: Book = marshal
            .get_or_load("book", None, || async {
                Err(CacheError::Other("loader must not run".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(cached, loaded);
    }

    #[tokio::test]
    async fn test_get_with_ttl_and_delete() {
        let marshal = Marshaler::new(byte_cache());
        marshal
            .set(
                "k",
                "v",
                Some(Options::new().with_expiration(Duration::from_secs(10))),
            )
            .await
            .unwrap();

        let (value, ttl): (String, _) = marshal.get_with_ttl("k").await.unwrap();
        assert_eq!(value, "v");
        assert!(ttl.is_some());

        marshal.delete("k").await.unwrap();
        marshal.clear().await.unwrap();
        assert!(marshal.get::<String>("k").await.unwrap_err().is_not_found());
    }
}
