//! Cache configuration types.

use crate::error::{CacheError, CacheResult};
use crate::tags::{DEFAULT_TAG_KEY_PREFIX, DEFAULT_TAG_TTL};
use std::time::Duration;

/// Cache backend type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    /// In-process moka cache
    Memory,
    /// Single Redis node
    Redis,
    /// Redis Cluster
    RedisCluster,
    /// Memcached backend
    Memcached,
}

impl std::fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CacheBackend::Memory => "Memory",
            CacheBackend::Redis => "Redis",
            CacheBackend::RedisCluster => "RedisCluster",
            CacheBackend::Memcached => "Memcached",
        };
        f.write_str(name)
    }
}

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Cache backend type
    pub backend: CacheBackend,

    /// Connection URL (first node for clusters, empty for memory)
    pub url: String,

    /// Additional cluster nodes
    pub cluster_nodes: Vec<String>,

    /// Key prefix for all cache keys
    pub key_prefix: Option<String>,

    /// Default TTL for cache entries
    pub default_ttl: Option<Duration>,

    /// Connection timeout
    pub connection_timeout: Duration,

    /// Timeout applied to every backend round trip
    pub operation_timeout: Duration,

    /// Prefix of tag index keys
    pub tag_key_prefix: String,

    /// TTL of tag index entries when a write doesn't override it
    pub tag_ttl: Duration,

    /// Total admission weight of the in-memory store
    pub max_capacity: u64,
}

impl CacheConfig {
    fn with_backend(backend: CacheBackend, url: String) -> Self {
        Self {
            backend,
            url,
            cluster_nodes: Vec::new(),
            key_prefix: None,
            default_ttl: None,
            connection_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(3),
            tag_key_prefix: DEFAULT_TAG_KEY_PREFIX.to_string(),
            tag_ttl: DEFAULT_TAG_TTL,
            max_capacity: 10_000,
        }
    }

    /// Create an in-memory cache configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_cache::CacheConfig;
    ///
    /// let config = CacheConfig::memory().with_max_capacity(1_000);
    /// assert_eq!(config.max_capacity, 1_000);
    /// ```
    pub fn memory() -> Self {
        Self::with_backend(CacheBackend::Memory, String::new())
    }

    /// Create a new Redis cache configuration.
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_cache::CacheConfig;
    ///
    /// let config = CacheConfig::redis("redis://localhost:6379").unwrap();
    /// ```
    pub fn redis(url: impl Into<String>) -> CacheResult<Self> {
        let url = url.into();
        if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
            return Err(CacheError::InvalidUrl(format!(
                "Invalid Redis URL: {}. Expected 'redis://host:port' or 'rediss://host:port'",
                url
            )));
        }
        Ok(Self::with_backend(CacheBackend::Redis, url))
    }

    /// Create a Redis Cluster configuration from its seed nodes.
    pub fn redis_cluster<I, S>(nodes: I) -> CacheResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut nodes: Vec<String> = nodes.into_iter().map(Into::into).collect();
        if nodes.is_empty() {
            return Err(CacheError::Config(
                "Redis Cluster needs at least one node".to_string(),
            ));
        }
        let first = nodes.remove(0);
        let mut config = Self::redis(first)?;
        config.backend = CacheBackend::RedisCluster;
        config.cluster_nodes = nodes;
        Ok(config)
    }

    /// Create a new Memcached cache configuration.
    ///
    /// Accepts `memcache://host:port` or a bare `host:port`.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_cache::CacheConfig;
    ///
    /// let config = CacheConfig::memcached("localhost:11211").unwrap();
    /// assert_eq!(config.url, "memcache://localhost:11211");
    /// ```
    pub fn memcached(url: impl Into<String>) -> CacheResult<Self> {
        let url = Self::parse_memcached_url(&url.into())?;
        Ok(Self::with_backend(CacheBackend::Memcached, url))
    }

    /// Load configuration from environment variables.
    ///
    /// `STRATA_CACHE_URL` picks the backend by scheme (no URL means memory).
    /// `STRATA_CACHE_PREFIX`, `STRATA_CACHE_DEFAULT_TTL_SECS` and
    /// `STRATA_CACHE_OPERATION_TIMEOUT_MS` are applied on top.
    pub fn from_env() -> CacheResult<Self> {
        let mut config = match std::env::var("STRATA_CACHE_URL") {
            Ok(url) if url.starts_with("redis") => Self::redis(url)?,
            Ok(url) if !url.is_empty() => Self::memcached(url)?,
            _ => Self::memory(),
        };

        if let Ok(prefix) = std::env::var("STRATA_CACHE_PREFIX") {
            config = config.with_key_prefix(prefix);
        }

        if let Ok(ttl) = std::env::var("STRATA_CACHE_DEFAULT_TTL_SECS") {
            let secs: u64 = ttl.parse().map_err(|_| {
                CacheError::Config(format!("STRATA_CACHE_DEFAULT_TTL_SECS: not a number: {}", ttl))
            })?;
            config = config.with_default_ttl(Duration::from_secs(secs));
        }

        if let Ok(timeout) = std::env::var("STRATA_CACHE_OPERATION_TIMEOUT_MS") {
            let millis: u64 = timeout.parse().map_err(|_| {
                CacheError::Config(format!(
                    "STRATA_CACHE_OPERATION_TIMEOUT_MS: not a number: {}",
                    timeout
                ))
            })?;
            config = config.with_operation_timeout(Duration::from_millis(millis));
        }

        Ok(config)
    }

    /// Converts "localhost:11211" to "memcache://localhost:11211".
    fn parse_memcached_url(url: &str) -> CacheResult<String> {
        if url.starts_with("memcache://") {
            Ok(url.to_string())
        } else if url.contains(':') && !url.contains("://") {
            Ok(format!("memcache://{}", url))
        } else {
            Err(CacheError::InvalidUrl(format!(
                "Invalid Memcached URL: {}. Expected format: 'memcache://host:port' or 'host:port'",
                url
            )))
        }
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set the connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the tag index key prefix.
    pub fn with_tag_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_key_prefix = prefix.into();
        self
    }

    /// Set the administrative tag TTL.
    pub fn with_tag_ttl(mut self, ttl: Duration) -> Self {
        self.tag_ttl = ttl;
        self
    }

    /// Set the in-memory capacity (total admission weight).
    pub fn with_max_capacity(mut self, max: u64) -> Self {
        self.max_capacity = max;
        self
    }

    /// Build the final key with prefix if configured.
    pub fn build_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// Build the (prefixed) tag index key of `tag`.
    pub fn tag_key(&self, tag: &str) -> String {
        self.build_key(&format!("{}{}", self.tag_key_prefix, tag))
    }

    /// Caller-facing key of a stored data key.
    ///
    /// `None` for keys outside the prefix and for tag index keys.
    pub fn caller_key<'a>(&self, stored: &'a str) -> Option<&'a str> {
        let key = match &self.key_prefix {
            Some(prefix) => stored.strip_prefix(prefix.as_str())?.strip_prefix(':')?,
            None => stored,
        };
        if !self.tag_key_prefix.is_empty() && key.starts_with(&self.tag_key_prefix) {
            return None;
        }
        Some(key)
    }
}
