use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;
use serial_test::serial;

use itsm::cache::{CacheStore, MemoryCacheBackend};
use itsm::infra::telemetry::describe_metrics;
use itsm::messaging::{MemoryBroker, MessageRelay, PublishOptions, QueueName, RelayOptions};

#[tokio::test]
#[serial]
async fn cache_and_relay_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    describe_metrics();

    let store = CacheStore::new(Arc::new(MemoryCacheBackend::new()));
    assert_eq!(store.get("GET:/services").await, None);
    store
        .set("GET:/services", &json!([]), Duration::from_secs(120))
        .await;
    assert!(store.get("GET:/services").await.is_some());
    store.flush_pattern("GET:/services*").await;

    let broker = MemoryBroker::new();
    let relay = MessageRelay::new(Arc::new(broker.clone()), RelayOptions::default());
    relay
        .publish_message(
            QueueName::ReportGenerate,
            json!({"report": "weekly"}),
            PublishOptions::default(),
        )
        .await
        .expect("publish");
    broker.fail_publishes(true);
    assert!(
        relay
            .publish_message(
                QueueName::ReportGenerate,
                json!({"report": "monthly"}),
                PublishOptions::default(),
            )
            .await
            .is_err()
    );

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for expected in [
        "itsm_cache_hit_total",
        "itsm_cache_miss_total",
        "itsm_cache_invalidated_total",
        "itsm_cache_operation_seconds",
        "itsm_queue_published_total",
        "itsm_queue_publish_errors_total",
    ] {
        assert!(names.contains(expected), "missing metric {expected}: {names:?}");
    }
}
