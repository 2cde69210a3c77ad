//! Integration tests for strata-metrics

use std::sync::Arc;
use strata_cache::*;
use strata_metrics::*;

fn memory_cache() -> Arc<dyn CacheInterface<String>> {
    Arc::new(Cache::<String>::new(Arc::new(MemoryStore::<String>::new(
        CacheConfig::memory(),
    ))))
}

#[tokio::test]
async fn test_metric_cache_feeds_prometheus() {
    let recorder = Arc::new(PrometheusRecorder::new("catalog").unwrap());
    let cache = MetricCache::with_recorder(memory_cache(), recorder.clone());

    cache.set("a", "1".to_string(), None).await.unwrap();
    cache.get("a").await.unwrap();
    cache.get("b").await.unwrap_err();
    cache.get("c").await.unwrap_err();

    let text = recorder.export();
    assert!(text.contains("# TYPE cache_collector gauge"));
    assert!(
        text.contains(r#"cache_collector{metric="hit_count",service="catalog",store="memory"} 1"#)
    );
    assert!(
        text.contains(r#"cache_collector{metric="miss_count",service="catalog",store="memory"} 2"#)
    );
    assert!(
        text.contains(r#"cache_collector{metric="set_success",service="catalog",store="memory"} 1"#)
    );
}

#[tokio::test]
async fn test_shared_recorder_labels_by_store() {
    let recorder = Arc::new(PrometheusRecorder::new("svc").unwrap());

    let plain = MetricCache::with_recorder(memory_cache(), recorder.clone());
    let chained: Arc<dyn CacheInterface<String>> =
        Arc::new(ChainCache::new(vec![memory_cache(), memory_cache()]));
    let chain = MetricCache::with_recorder(chained, recorder.clone());

    plain.set("k", "v".to_string(), None).await.unwrap();
    chain.set("k", "v".to_string(), None).await.unwrap();
    chain.clear().await.unwrap();

    let text = recorder.export();
    assert!(text.contains(r#"metric="set_success",service="svc",store="memory"} 1"#));
    assert!(text.contains(r#"metric="set_success",service="svc",store="chain"} 1"#));
    assert!(text.contains(r#"metric="clear_success",service="svc",store="chain"} 1"#));
}

#[test]
fn test_recorder_on_caller_registry() {
    let registry = prometheus::Registry::new();
    let recorder = PrometheusRecorder::with_registry("svc", registry.clone()).unwrap();

    recorder.record("redis", &StatsSnapshot::default());

    let text = export_metrics_from_registry(&registry);
    assert!(text.contains(r#"store="redis""#));
    assert_eq!(recorder.service(), "svc");
}
