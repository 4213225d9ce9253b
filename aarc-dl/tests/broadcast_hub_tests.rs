//! Broadcast hub delivery tests: isolation, ordering, empty hub

mod helpers;

use aarc_common::events::{AarcEvent, JobStatus, JobStatusUpdate};
use aarc_dl::services::{BroadcastHub, ObserverSink, SinkError};
use async_trait::async_trait;
use helpers::{wait_until, RecordingSink};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn update(id: Uuid, progress: u8) -> AarcEvent {
    AarcEvent::JobStatusUpdate(JobStatusUpdate {
        id,
        status: JobStatus::Running,
        progress,
        progress_label: format!("step {}", progress),
    })
}

/// Sink that takes a long time per message
struct StalledSink;

#[async_trait]
impl ObserverSink for StalledSink {
    fn is_open(&self) -> bool {
        true
    }

    async fn send_text(&self, _message: Arc<str>) -> Result<(), SinkError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

#[tokio::test]
async fn publish_with_no_observers_is_noop() {
    let hub = BroadcastHub::new();
    assert_eq!(hub.publish(&update(Uuid::new_v4(), 10)), 0);
    assert_eq!(hub.connection_count(), 0);
}

#[tokio::test]
async fn failing_observer_does_not_affect_others() {
    let hub = BroadcastHub::new();
    let broken = RecordingSink::broken();
    let healthy = RecordingSink::new();
    hub.register(broken.clone());
    hub.register(healthy.clone());

    let id = Uuid::new_v4();
    assert_eq!(hub.publish(&update(id, 10)), 2);
    assert_eq!(hub.publish(&update(id, 20)), 2);

    wait_until("healthy observer got both", || healthy.messages().len() == 2).await;
    assert!(broken.messages().is_empty());
    // Broken connection stays registered until its own teardown removes it
    assert_eq!(hub.connection_count(), 2);
}

#[tokio::test]
async fn stalled_observer_does_not_block_others() {
    let hub = BroadcastHub::new();
    hub.register(Arc::new(StalledSink));
    let healthy = RecordingSink::new();
    hub.register(healthy.clone());

    hub.publish(&update(Uuid::new_v4(), 10));

    tokio::time::timeout(Duration::from_secs(1), async {
        while healthy.messages().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("healthy observer should not wait on the stalled one");
}

#[tokio::test]
async fn per_connection_order_matches_publish_order() {
    let hub = BroadcastHub::new();
    let sink = RecordingSink::new();
    hub.register(sink.clone());

    let id = Uuid::new_v4();
    for progress in 0..=100u8 {
        hub.publish(&update(id, progress));
    }

    wait_until("all updates delivered", || sink.messages().len() == 101).await;
    let received: Vec<u64> = sink
        .events()
        .iter()
        .map(|e| e["payload"]["progress"].as_u64().unwrap())
        .collect();
    assert_eq!(received, (0..=100u64).collect::<Vec<_>>());
}

#[tokio::test]
async fn closed_observer_is_skipped_and_unregister_releases_it() {
    let hub = BroadcastHub::new();
    let closing = RecordingSink::new();
    let id = hub.register(closing.clone());

    closing.close();
    assert_eq!(hub.publish(&update(Uuid::new_v4(), 5)), 0);

    assert!(hub.unregister(id));
    assert!(!hub.unregister(id));
    assert_eq!(hub.connection_count(), 0);
}

#[tokio::test]
async fn envelope_is_tagged_kind_and_payload() {
    let hub = BroadcastHub::new();
    let sink = RecordingSink::new();
    hub.register(sink.clone());

    let id = Uuid::new_v4();
    hub.publish(&update(id, 42));
    wait_until("message delivered", || sink.messages().len() == 1).await;

    let event = &sink.events()[0];
    assert_eq!(event["kind"], "JobStatusUpdate");
    assert_eq!(event["payload"]["id"], id.to_string());
    assert_eq!(event["payload"]["progress"], 42);
    assert_eq!(event["payload"]["progressLabel"], "step 42");
}
