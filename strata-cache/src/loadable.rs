//! Read-through cache backed by a loader function.

use crate::cache::CacheInterface;
use crate::error::CacheResult;
use crate::options::{InvalidateOptions, Options};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default number of write-backs waiting for the setter task.
pub const DEFAULT_WRITE_BACK_CAPACITY: usize = 1024;

/// Loader invoked on a miss.
pub type LoadFunction<V> = Arc<dyn Fn(String) -> BoxFuture<'static, CacheResult<V>> + Send + Sync>;

struct WriteBack<V> {
    key: String,
    value: V,
}

/// Cache that fills misses from a loader.
///
/// A loaded value is returned immediately and written back to the inner
/// cache by a background setter task. The write-back queue is bounded; when
/// it is full the value is still returned but not written back. Loader
/// errors are returned unchanged and nothing is cached for them.
///
/// # Examples
///
/// ```
/// use strata_cache::*;
/// use std::sync::Arc;
///
/// # async fn example() -> CacheResult<()> {
/// let inner: Arc<dyn CacheInterface<String>> =
///     Arc::new(Cache::<String>::new(Arc::new(MemoryStore::<String>::new(CacheConfig::memory()))));
///
/// let cache = LoadableCache::new(inner.clone(), |key: String| async move {
///     Ok(format!("loaded {}", key))
/// });
///
/// assert_eq!(cache.get("k").await?, "loaded k");
///
/// cache.close().await;
/// assert_eq!(inner.get("k").await?, "loaded k");
/// # Ok(())
/// # }
/// ```
pub struct LoadableCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<dyn CacheInterface<V>>,
    loader: LoadFunction<V>,
    write_options: Option<Options>,
    capacity: usize,
    setter: Mutex<Option<mpsc::Sender<WriteBack<V>>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<V> LoadableCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a loadable cache over `inner`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<F, Fut>(inner: Arc<dyn CacheInterface<V>>, loader: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CacheResult<V>> + Send + 'static,
    {
        let loader: LoadFunction<V> = Arc::new(move |key: String| loader(key).boxed());
        Self::with_loader(inner, loader, None)
    }

    /// Create a loadable cache from a boxed loader, writing loaded values
    /// back with `write_options`.
    pub fn with_loader(
        inner: Arc<dyn CacheInterface<V>>,
        loader: LoadFunction<V>,
        write_options: Option<Options>,
    ) -> Self {
        Self::build(inner, loader, write_options, DEFAULT_WRITE_BACK_CAPACITY)
    }

    fn build(
        inner: Arc<dyn CacheInterface<V>>,
        loader: LoadFunction<V>,
        write_options: Option<Options>,
        capacity: usize,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<WriteBack<V>>(capacity.max(1));

        let setter_inner = inner.clone();
        let options = write_options.clone();
        let task = tokio::spawn(async move {
            while let Some(write) = rx.recv().await {
                match setter_inner
                    .set(&write.key, write.value, options.clone())
                    .await
                {
                    Ok(()) => debug!(key = %write.key, "Wrote back loaded value"),
                    Err(e) => warn!(key = %write.key, error = %e, "Write-back of loaded value failed"),
                }
            }
        });

        Self {
            inner,
            loader,
            write_options,
            capacity,
            setter: Mutex::new(Some(tx)),
            task: Mutex::new(Some(task)),
        }
    }

    /// Use `options` for write-backs.
    ///
    /// Must be called from within a tokio runtime; restarts the setter task.
    pub fn with_write_options(self, options: Options) -> Self {
        let capacity = self.capacity;
        self.restart(Some(options), capacity)
    }

    /// Bound the write-back queue to `capacity` pending values.
    ///
    /// Must be called from within a tokio runtime; restarts the setter task.
    pub fn with_write_back_capacity(self, capacity: usize) -> Self {
        let options = self.write_options.clone();
        self.restart(options, capacity)
    }

    fn restart(self, write_options: Option<Options>, capacity: usize) -> Self {
        let Self {
            inner,
            loader,
            setter,
            task,
            ..
        } = self;
        drop(setter);
        drop(task);
        Self::build(inner, loader, write_options, capacity)
    }

    /// The wrapped cache.
    pub fn inner(&self) -> &Arc<dyn CacheInterface<V>> {
        &self.inner
    }

    /// Drain pending write-backs and stop the setter task.
    ///
    /// Later misses still load but are no longer written back.
    pub async fn close(&self) {
        self.setter.lock().take();

        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    async fn load(&self, key: &str) -> CacheResult<V> {
        let value = (self.loader)(key.to_string()).await?;

        let write = WriteBack {
            key: key.to_string(),
            value: value.clone(),
        };
        let queued = match self.setter.lock().as_ref() {
            Some(tx) => tx.try_send(write),
            None => Err(TrySendError::Closed(write)),
        };
        match queued {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(key = %key, "Write-back queue full; loaded value not written back")
            }
            Err(TrySendError::Closed(_)) => {
                warn!(key = %key, "Loadable cache closed; loaded value not written back")
            }
        }

        Ok(value)
    }
}

#[async_trait]
impl<V> CacheInterface<V> for LoadableCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> CacheResult<V> {
        match self.inner.get(key).await {
            Err(e) if e.is_not_found() => self.load(key).await,
            other => other,
        }
    }

    async fn get_with_ttl(&self, key: &str) -> CacheResult<(V, Option<Duration>)> {
        match self.inner.get_with_ttl(key).await {
            Err(e) if e.is_not_found() => {
                let value = self.load(key).await?;
                let ttl = self.write_options.as_ref().and_then(|o| o.ttl(None));
                Ok((value, ttl))
            }
            other => other,
        }
    }

    async fn set(&self, key: &str, value: V, options: Option<Options>) -> CacheResult<()> {
        self.inner.set(key, value, options).await
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.inner.delete(key).await
    }

    async fn invalidate(&self, options: InvalidateOptions) -> CacheResult<()> {
        self.inner.invalidate(options).await
    }

    async fn clear(&self) -> CacheResult<()> {
        self.inner.clear().await
    }

    fn cache_type(&self) -> &'static str {
        "loadable"
    }
}
