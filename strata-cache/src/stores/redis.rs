//! Redis store.
//!
//! Values are stored as plain strings under their (prefixed) key. Each tag
//! index entry is a native Redis set, extended with `SADD` so concurrent
//! tagged writes never lose members.

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::options::{InvalidateOptions, Options};
use crate::store::Store;
use crate::tags::{self, TagIndex};
use crate::watch::{EventKind, StoreEvent, Watcher};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::{Client, FromRedisValue, RedisResult, ToRedisArgs};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info};

/// Channel pattern of every keyspace event.
const KEYEVENT_PATTERN: &str = "__keyevent@*__:*";

/// Redis store over any async connection.
///
/// `C` is a [`ConnectionManager`] for a single node, a cluster connection
/// (feature `cluster`), or any other [`ConnectionLike`] such as a
/// sentinel-resolved multiplexed connection.
#[derive(Clone)]
pub struct RedisStore<C = ConnectionManager>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    connection: C,
    config: CacheConfig,
    watcher: Option<Arc<Watcher>>,
}

impl RedisStore<ConnectionManager> {
    /// Connect to a single Redis node.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use strata_cache::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), CacheError> {
    ///     let config = CacheConfig::redis("redis://localhost:6379")?;
    ///     let store = RedisStore::new(config).await?;
    ///     store.set("key", "value".to_string(), &Options::default()).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: CacheConfig) -> CacheResult<Self> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| CacheError::Connection(e.to_string()))?;

        let connection = tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout)?
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        info!(url = %config.url, "Connected Redis store");

        Ok(Self::from_connection(connection, config))
    }
}

#[cfg(feature = "cluster")]
impl RedisStore<redis::cluster_async::ClusterConnection> {
    /// Connect to a Redis Cluster through its seed nodes.
    pub async fn cluster(config: CacheConfig) -> CacheResult<Self> {
        let nodes: Vec<String> = std::iter::once(config.url.clone())
            .chain(config.cluster_nodes.iter().cloned())
            .collect();

        let client = redis::cluster::ClusterClient::new(nodes)
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        let connection = tokio::time::timeout(config.connection_timeout, client.get_async_connection())
            .await
            .map_err(|_| CacheError::Timeout)?
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        info!(
            seed = %config.url,
            nodes = config.cluster_nodes.len() + 1,
            "Connected Redis Cluster store"
        );

        Ok(Self::from_connection(connection, config))
    }
}

impl<C> RedisStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    /// Use an already established connection.
    pub fn from_connection(connection: C, config: CacheConfig) -> Self {
        Self {
            connection,
            config,
            watcher: None,
        }
    }

    /// Get the underlying connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Subscribe to keyspace notifications through `client` and report them
    /// through a [`Watcher`].
    ///
    /// The server must have keyspace events enabled, for example with
    /// `notify-keyspace-events Egx$`. Only keys under this store's prefix are
    /// reported, without the prefix; tag index keys are skipped. The
    /// subscription ends with [`RedisStore::shutdown`].
    pub async fn watch(mut self, client: &Client) -> CacheResult<Self> {
        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        pubsub.psubscribe(KEYEVENT_PATTERN).await?;

        info!(pattern = KEYEVENT_PATTERN, "Subscribed to Redis keyspace events");

        let (tx, rx) = mpsc::unbounded_channel();
        let config = self.config.clone();

        let forwarder = tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                let stored: String = match msg.get_payload() {
                    Ok(key) => key,
                    Err(e) => {
                        error!(error = %e, "Failed to decode keyspace event payload");
                        continue;
                    }
                };
                let Some(event) = keyspace_event(&config, msg.get_channel_name(), &stored) else {
                    continue;
                };

                if tx.send(event).is_err() {
                    debug!("Keyspace event receiver dropped");
                    break;
                }
            }
        });

        let watcher = Watcher::spawn(UnboundedReceiverStream::new(rx));
        watcher.attach(forwarder);
        self.watcher = Some(Arc::new(watcher));
        Ok(self)
    }

    /// The change watcher, when enabled with [`RedisStore::watch`].
    pub fn watcher(&self) -> Option<&Watcher> {
        self.watcher.as_deref()
    }

    /// Stop the watch loop, if any.
    pub async fn shutdown(&self) {
        if let Some(watcher) = &self.watcher {
            watcher.shutdown().await;
        }
    }

    /// Build the full key with prefix.
    fn build_key(&self, key: &str) -> String {
        self.config.build_key(key)
    }

    /// Bound one round trip by the operation timeout.
    async fn round_trip<T, F>(&self, request: F) -> CacheResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.operation_timeout, request).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout),
        }
    }
}

/// Event for a keyspace notification about `stored`, when it concerns a data
/// key of this store.
fn keyspace_event(config: &CacheConfig, channel: &str, stored: &str) -> Option<StoreEvent> {
    let key = config.caller_key(stored)?;
    let kind = event_kind(channel)?;
    Some(StoreEvent::new(key, kind))
}

/// Map a `__keyevent@<db>__:<event>` channel to an event kind.
fn event_kind(channel: &str) -> Option<EventKind> {
    match channel.rsplit(':').next()? {
        "set" => Some(EventKind::Set),
        "del" => Some(EventKind::Deleted),
        "expired" => Some(EventKind::Expired),
        "evicted" => Some(EventKind::Evicted),
        _ => None,
    }
}

/// Remaining TTL from a `PTTL` reply. `-1` means no expiry.
fn ttl_from_pttl(millis: i64) -> Option<Duration> {
    u64::try_from(millis).ok().map(Duration::from_millis)
}

/// `SET`, with `PX` only for entries that expire.
fn set_command<V: ToRedisArgs>(full_key: &str, value: V, ttl: Option<Duration>) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(full_key).arg(value);
    if let Some(ttl) = ttl {
        cmd.arg("PX").arg(px_millis(ttl));
    }
    cmd
}

/// `PX` argument for a TTL; Redis rejects zero.
fn px_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl<C, V> Store<V> for RedisStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
    V: ToRedisArgs + FromRedisValue + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> CacheResult<V> {
        let full_key = self.build_key(key);
        let mut conn = self.connection.clone();

        let value: Option<V> = self
            .round_trip(redis::cmd("GET").arg(&full_key).query_async(&mut conn))
            .await?;
        value.ok_or_else(|| CacheError::not_found(key))
    }

    async fn get_with_ttl(&self, key: &str) -> CacheResult<(V, Option<Duration>)> {
        let full_key = self.build_key(key);
        let mut conn = self.connection.clone();

        let (value, pttl): (Option<V>, i64) = self
            .round_trip(
                redis::pipe()
                    .cmd("GET")
                    .arg(&full_key)
                    .cmd("PTTL")
                    .arg(&full_key)
                    .query_async(&mut conn),
            )
            .await?;

        match value {
            Some(value) => Ok((value, ttl_from_pttl(pttl))),
            None => Err(CacheError::not_found(key)),
        }
    }

    async fn set(&self, key: &str, value: V, options: &Options) -> CacheResult<()> {
        let full_key = self.build_key(key);
        let mut conn = self.connection.clone();

        let cmd = set_command(&full_key, value, options.ttl(self.config.default_ttl));
        let _: () = self.round_trip(cmd.query_async(&mut conn)).await?;

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
        let mut conn = self.connection.clone();
        let _: () = self
            .round_trip(redis::cmd("FLUSHDB").query_async(&mut conn))
            .await?;
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}

#[async_trait]
impl<C> TagIndex for RedisStore<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn members(&self, tag_key: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.connection.clone();
        self.round_trip(redis::cmd("SMEMBERS").arg(tag_key).query_async(&mut conn))
            .await
    }

    async fn add_member(&self, tag_key: &str, member: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        let _: () = self
            .round_trip(
                redis::pipe()
                    .cmd("SADD")
                    .arg(tag_key)
                    .arg(member)
                    .ignore()
                    .cmd("PEXPIRE")
                    .arg(tag_key)
                    .arg(px_millis(ttl))
                    .ignore()
                    .query_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        let _: () = self
            .round_trip(redis::cmd("DEL").arg(key).query_async(&mut conn))
            .await?;
        Ok(())
    }
}
