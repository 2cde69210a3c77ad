//! Prometheus-backed [`MetricsRecorder`].

use prometheus::{GaugeVec, Opts, Registry};
use strata_cache::{MetricsRecorder, StatsSnapshot};

/// Name of the exported gauge vector.
pub const COLLECTOR_NAME: &str = "cache_collector";

/// Publishes cache counters as `cache_collector{service, store, metric}`.
#[derive(Clone)]
pub struct PrometheusRecorder {
    service: String,
    registry: Registry,
    collector: GaugeVec,
}

impl PrometheusRecorder {
    /// Create a recorder with its own registry.
    pub fn new(service: impl Into<String>) -> Result<Self, prometheus::Error> {
        Self::with_registry(service, Registry::new())
    }

    /// Create a recorder registering on `registry`.
    ///
    /// Fails if the registry already holds a `cache_collector`; share one
    /// recorder between caches of a service instead. Each cache is labelled
    /// with its `cache_type`, so shared caches should sit on distinct backends.
    pub fn with_registry(
        service: impl Into<String>,
        registry: Registry,
    ) -> Result<Self, prometheus::Error> {
        let collector = GaugeVec::new(
            Opts::new(COLLECTOR_NAME, "This represent the number of items in cache"),
            &["service", "store", "metric"],
        )?;
        registry.register(Box::new(collector.clone()))?;

        Ok(Self {
            service: service.into(),
            registry,
            collector,
        })
    }

    /// Service label value.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The registry the collector lives in.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text format.
    pub fn export(&self) -> String {
        crate::export_metrics_from_registry(&self.registry)
    }
}

impl MetricsRecorder for PrometheusRecorder {
    fn record(&self, cache_type: &str, stats: &StatsSnapshot) {
        for (metric, value) in stats.metrics() {
            self.collector
                .with_label_values(&[self.service.as_str(), cache_type, metric])
                .set(value as f64);
        }
    }
}

impl std::fmt::Debug for PrometheusRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusRecorder")
            .field("service", &self.service)
            .finish()
    }
}
