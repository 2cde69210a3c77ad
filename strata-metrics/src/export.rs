//! Text exposition of a registry.

use prometheus::{Encoder, Registry, TextEncoder};

/// Export metrics from a specific registry
///
/// # Examples
///
/// ```
/// use strata_metrics::*;
/// use prometheus::Registry;
///
/// let registry = Registry::new();
/// let metrics = export_metrics_from_registry(&registry);
/// assert!(metrics.is_empty());
/// ```
pub fn export_metrics_from_registry(registry: &Registry) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|_| String::from("# Error converting metrics to UTF-8\n"))
}
