//! Metric names emitted by the cache, publisher, listener and broadcaster.

mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use uuid::Uuid;

use taskflow::application::tasks::CreateTaskCommand;
use taskflow::domain::events::ChangeEvent;
use taskflow::events::{Broadcaster, MemoryBus, NotificationListener};
use taskflow::infra::telemetry;

use support::{CHANNEL, TaskHarness};

#[tokio::test]
async fn write_and_read_paths_emit_expected_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let harness = TaskHarness::new();
    let command = || CreateTaskCommand {
        title: "x".to_string(),
        description: "y".to_string(),
        ..Default::default()
    };

    // miss, then hit
    harness.service.list_tasks().await.expect("read");
    harness.service.list_tasks().await.expect("read");

    // published, invalidated
    harness.service.create_task(command()).await.expect("create");

    // store failure on the next miss
    harness.backend.fail_writes(true);
    harness.service.list_tasks().await.expect("read");
    harness.backend.fail_writes(false);

    // invalidation and publish failures
    harness.backend.fail_deletes(true);
    harness.bus.fail_publish(true);
    harness.service.create_task(command()).await.expect("create");

    // malformed payload, broadcast and connection gauge
    let broadcaster = Broadcaster::new(8);
    let listener = NotificationListener::new(
        Arc::new(MemoryBus::new()),
        broadcaster.clone(),
        CHANNEL,
        Duration::from_millis(20),
    );
    let _subscription = broadcaster.attach();
    assert!(listener.handle_payload("garbage").is_err());
    let valid = serde_json::to_string(&ChangeEvent::Deleted {
        task_id: Uuid::new_v4(),
    })
    .expect("encode");
    assert_eq!(listener.handle_payload(&valid).expect("valid event"), 1);

    let mut counters: HashMap<String, u64> = HashMap::new();
    let mut gauges: HashMap<String, f64> = HashMap::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let name = composite_key.key().name().to_string();
        match value {
            DebugValue::Counter(count) => *counters.entry(name).or_default() += count,
            DebugValue::Gauge(level) => {
                gauges.insert(name, level.into_inner());
            }
            DebugValue::Histogram(_) => {}
        }
    }

    let expect_counter = |name: &str, expected: u64| {
        assert_eq!(
            counters.get(name).copied(),
            Some(expected),
            "counter {name} in {counters:?}"
        );
    };
    expect_counter("taskflow_cache_miss_total", 2);
    expect_counter("taskflow_cache_hit_total", 1);
    expect_counter("taskflow_cache_store_failed_total", 1);
    expect_counter("taskflow_cache_invalidate_failed_total", 1);
    expect_counter("taskflow_events_published_total", 1);
    expect_counter("taskflow_events_publish_failed_total", 1);
    expect_counter("taskflow_events_malformed_total", 1);
    expect_counter("taskflow_events_broadcast_total", 1);

    assert_eq!(gauges.get("taskflow_notification_connections"), Some(&1.0));
}
