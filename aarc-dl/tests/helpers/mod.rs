//! Test Helper Utilities
//!
//! Shared doubles and wiring for aarc-dl integration tests

#![allow(dead_code)]

pub mod fakes;
pub mod log_capture;

pub use fakes::{Behaviour, FakeDownloader, RecordingSink, StubFinalizer};
pub use log_capture::LogCapture;

use aarc_common::events::{AudioFormat, JobPayload, JobSnapshot, JobStatus};
use aarc_dl::services::{BroadcastHub, JobQueue, JobRegistry, PatternClassifier};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub fn payload(url: &str) -> JobPayload {
    JobPayload {
        url: url.to_string(),
        format: AudioFormat::Mp3,
        quality: None,
        lyrics: None,
    }
}

/// Queue over a fresh registry and hub, using the pattern classifier
pub fn queue_with(downloader: Arc<FakeDownloader>, capacity: usize) -> Arc<JobQueue> {
    queue_with_finalizer(downloader, Arc::new(StubFinalizer::default()), capacity)
}

pub fn queue_with_finalizer(
    downloader: Arc<FakeDownloader>,
    finalizer: Arc<StubFinalizer>,
    capacity: usize,
) -> Arc<JobQueue> {
    let registry = Arc::new(JobRegistry::new(BroadcastHub::new()));
    Arc::new(JobQueue::new(
        registry,
        capacity,
        downloader,
        Arc::new(PatternClassifier::new()),
        finalizer,
    ))
}

/// Poll until job `id` reaches `status`; panics after two seconds
pub async fn wait_for_status(queue: &JobQueue, id: Uuid, status: JobStatus) -> JobSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(job) = queue.registry().get(id) {
            if job.status == status {
                return job;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "job {} never reached {}; last seen {:?}",
                id,
                status,
                queue.registry().get(id)
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll until `check` holds; panics after two seconds
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
