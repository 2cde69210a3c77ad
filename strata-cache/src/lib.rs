//! Tag-aware caching for async Rust.
//!
//! Provides one cache contract over several backends, with tag-based bulk
//! invalidation and composable decorators.
//!
//! # Features
//!
//! - `redis` - Redis store (enabled by default)
//! - `cluster` - Redis Cluster topology for the Redis store
//! - `memcached` - Memcached store (requires explicit opt-in)
//! - **Tag-based invalidation** - Invalidate every entry written with a tag
//! - **Decorators** - Typed JSON access, metrics, multi-tier chains and
//!   read-through loading, stackable in any order
//! - **Watch** - Change notifications from stores with native event sources
//!
//! # Examples
//!
//! ## Tag-based Invalidation
//!
//! ```
//! use strata_cache::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> CacheResult<()> {
//! let cache = Cache::<String>::new(Arc::new(MemoryStore::<String>::new(CacheConfig::memory())));
//!
//! cache
//!     .set(
//!         "user:123",
//!         r#"{"name":"Alice"}"#.to_string(),
//!         Some(Options::new().with_tags(["users", "active-users"])),
//!     )
//!     .await?;
//!
//! // Drops every entry tagged "users"
//! cache.invalidate(InvalidateOptions::tags(["users"])).await?;
//! assert!(cache.get("user:123").await.unwrap_err().is_not_found());
//! # Ok(())
//! # }
//! ```
//!
//! ## Multi-tier Caching
//!
//! ```no_run
//! use strata_cache::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> CacheResult<()> {
//! let l1: Arc<dyn CacheInterface<String>> =
//!     Arc::new(Cache::<String>::new(Arc::new(MemoryStore::<String>::new(CacheConfig::memory()))));
//! let l2: Arc<dyn CacheInterface<String>> = Arc::new(Cache::<String>::new(Arc::new(
//!     RedisStore::new(CacheConfig::redis("redis://localhost:6379")?).await?,
//! )));
//!
//! let chain: Arc<dyn CacheInterface<String>> = Arc::new(ChainCache::new(vec![l1, l2]));
//! let metered: Arc<dyn CacheInterface<String>> = Arc::new(MetricCache::new(chain));
//! let cache = Marshaler::new(metered);
//!
//! cache.set("answer", &42, None).await?;
//! let answer: u32 = cache.get("answer").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Memcached Store (requires `memcached` feature)
//!
//! ```ignore
//! use strata_cache::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), CacheError> {
//!     let config = CacheConfig::memcached("memcache://localhost:11211")?;
//!     let store = MemcachedStore::new(config).await?;
//!
//!     store.set("key", "value".to_string(), &Options::default()).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod chain;
pub mod config;
pub mod error;
pub mod loadable;
pub mod marshaler;
pub mod metric;
pub mod options;
pub mod store;
pub mod stores;
pub mod tags;
pub mod watch;

pub use cache::{Cache, CacheInterface};
pub use chain::ChainCache;
pub use config::{CacheBackend, CacheConfig};
pub use error::{CacheError, CacheResult};
pub use loadable::{LoadFunction, LoadableCache};
pub use marshaler::{MarshalValue, Marshaler};
pub use metric::{MetricCache, MetricsRecorder, Stats, StatsSnapshot};
pub use options::{InvalidateOptions, Options};
pub use store::Store;
pub use stores::MemoryStore;
pub use tags::TagIndex;
pub use watch::{EventHandler, EventKind, StoreEvent, Watcher};

#[cfg(feature = "redis")]
pub use stores::RedisStore;

#[cfg(feature = "memcached")]
pub use stores::MemcachedStore;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{Cache, CacheInterface};
    pub use crate::chain::ChainCache;
    pub use crate::config::CacheConfig;
    pub use crate::error::{CacheError, CacheResult};
    pub use crate::loadable::LoadableCache;
    pub use crate::marshaler::Marshaler;
    pub use crate::metric::{MetricCache, MetricsRecorder, StatsSnapshot};
    pub use crate::options::{InvalidateOptions, Options};
    pub use crate::store::Store;
    pub use crate::stores::MemoryStore;

    #[cfg(feature = "redis")]
    pub use crate::stores::RedisStore;

    #[cfg(feature = "memcached")]
    pub use crate::stores::MemcachedStore;
}
