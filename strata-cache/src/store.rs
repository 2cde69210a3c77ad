//! Store trait definition.

use crate::error::CacheResult;
use crate::options::{InvalidateOptions, Options};
use async_trait::async_trait;
use std::time::Duration;

/// Store trait implemented once per backend.
///
/// A store owns the tag index of the data it holds: tagged writes extend the
/// index with the backend's own primitives, and [`Store::invalidate`] resolves
/// and clears it (see [`crate::tags`]).
#[async_trait]
pub trait Store<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    /// Get a value from the store.
    ///
    /// Returns [`CacheError::NotFound`](crate::CacheError::NotFound) when the
    /// key is absent or expired.
    async fn get(&self, key: &str) -> CacheResult<V>;

    /// Get a value together with its remaining time-to-live.
    ///
    /// The TTL is `None` when the entry never expires.
    async fn get_with_ttl(&self, key: &str) -> CacheResult<(V, Option<Duration>)>;

    /// Set a value.
    ///
    /// # Arguments
    ///
    /// * `key` - The cache key
    /// * `value` - The value
    /// * `options` - Expiration, tags and backend extensions
    ///
    /// Tag index maintenance is best-effort: a failure there is logged and
    /// does not fail the write.
    async fn set(&self, key: &str, value: V, options: &Options) -> CacheResult<()>;

    /// Delete a key from the store.
    ///
    /// Tag memberships of the key are left in place.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Delete every entry indexed under any of the given tags, then the tag
    /// index entries themselves.
    async fn invalidate(&self, options: &InvalidateOptions) -> CacheResult<()>;

    /// Clear all keys from the store.
    ///
    /// **Warning:** This operation may be destructive and affect all keys.
    async fn clear(&self) -> CacheResult<()>;

    /// Stable identifier of the backend (`"memory"`, `"redis"`, ...).
    fn store_type(&self) -> &'static str;
}
