//! Store adapters, one per backend.

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "memcached")]
pub mod memcached;

pub use memory::MemoryStore;

#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

#[cfg(feature = "memcached")]
pub use memcached::MemcachedStore;
