// Strata - tag-aware caching for async Rust
//
// This library re-exports the cache core and, behind features, the
// Prometheus exporter.

// Re-export core functionality
pub use strata_cache::*;

// Re-export optional crates
#[cfg(feature = "metrics")]
pub use strata_metrics;

#[cfg(feature = "metrics")]
pub use strata_metrics::PrometheusRecorder;
