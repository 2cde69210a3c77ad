//! Change notifications from stores with native event sources.
//!
//! A [`Watcher`] owns one background task per store. The task drains the
//! store's event stream and hands each event to the handler registered at
//! that moment. Handlers can be swapped at any time; the last registration
//! wins and the loop never holds on to a replaced handler.

use futures::{Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// What happened to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Written or overwritten
    Set,
    /// Removed by an explicit delete, invalidation or clear
    Deleted,
    /// Removed because its TTL elapsed
    Expired,
    /// Removed to make room for other entries
    Evicted,
}

/// A change observed on a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    /// Key as the caller wrote it, without the store's key prefix
    pub key: String,
    /// Kind of change
    pub kind: EventKind,
}

impl StoreEvent {
    /// Create a new event.
    pub fn new(key: impl Into<String>, kind: EventKind) -> Self {
        Self {
            key: key.into(),
            kind,
        }
    }
}

/// Event callback. Runs on the watch task, so it should return quickly.
pub type EventHandler = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Background watch loop with a swappable handler.
pub struct Watcher {
    handler: Arc<RwLock<Option<EventHandler>>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    sources: Mutex<Vec<JoinHandle<()>>>,
}

impl Watcher {
    /// Start the watch loop over `events`.
    ///
    /// Must be called from within a tokio runtime. The loop ends when the
    /// stream ends or on [`Watcher::shutdown`].
    pub fn spawn<S>(events: S) -> Self
    where
        S: Stream<Item = StoreEvent> + Send + 'static,
    {
        let handler: Arc<RwLock<Option<EventHandler>>> = Arc::new(RwLock::new(None));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let slot = handler.clone();
        let task = tokio::spawn(async move {
            let mut events = Box::pin(events);
            debug!("Watch loop started");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    next = events.next() => match next {
                        Some(event) => {
                            // Clone out so the lock isn't held while the handler runs
                            let current = slot.read().clone();
                            if let Some(handler) = current {
                                handler(&event);
                            }
                        }
                        None => break,
                    },
                }
            }

            debug!("Watch loop stopped");
        });

        Self {
            handler,
            shutdown: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
            sources: Mutex::new(Vec::new()),
        }
    }

    /// Tie a task producing this watcher's events to its lifetime.
    ///
    /// The task is aborted on [`Watcher::shutdown`] or drop.
    pub fn attach(&self, source: JoinHandle<()>) {
        self.sources.lock().push(source);
    }

    /// Register the event handler, replacing the previous one.
    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        *self.handler.write() = Some(Arc::new(handler));
    }

    /// Remove the event handler. Events keep being drained.
    pub fn clear_handler(&self) {
        *self.handler.write() = None;
    }

    /// Whether the watch loop is still running.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop the watch loop and its sources, and wait for them to finish.
    pub async fn shutdown(&self) {
        let sources: Vec<JoinHandle<()>> = self.sources.lock().drain(..).collect();
        for source in &sources {
            source.abort();
        }
        for source in sources {
            let _ = source.await;
        }

        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        for source in self.sources.get_mut().drain(..) {
            source.abort();
        }
        if let Some(tx) = self.shutdown.get_mut().take() {
            let _ = tx.send(());
        }
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("running", &self.is_running())
            .field("has_handler", &self.handler.read().is_some())
            .finish()
    }
}
