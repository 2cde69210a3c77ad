//! Prometheus export of strata cache statistics.
//!
//! [`PrometheusRecorder`] implements [`strata_cache::MetricsRecorder`]: hand
//! it to [`strata_cache::MetricCache::with_recorder`] and every decorated
//! call updates a `cache_collector` gauge vector labelled by service, store
//! and counter name.
//!
//! No process-global registry is used; each recorder owns (or is given)
//! its own [`prometheus::Registry`].
//!
//! # Quick Start
//!
//! ```
//! use strata_cache::*;
//! use strata_metrics::PrometheusRecorder;
//! use std::sync::Arc;
//!
//! # async fn example() -> CacheResult<()> {
//! let recorder = Arc::new(PrometheusRecorder::new("catalog").unwrap());
//!
//! let inner: Arc<dyn CacheInterface<String>> =
//!     Arc::new(Cache::<String>::new(Arc::new(MemoryStore::<String>::new(CacheConfig::memory()))));
//! let cache = MetricCache::with_recorder(inner, recorder.clone());
//!
//! cache.set("k", "v".to_string(), None).await?;
//!
//! let text = recorder.export();
//! assert!(text.contains("cache_collector"));
//! # Ok(())
//! # }
//! ```

pub mod export;
pub mod recorder;

pub use export::export_metrics_from_registry;
pub use prometheus;
pub use recorder::{COLLECTOR_NAME, PrometheusRecorder};
