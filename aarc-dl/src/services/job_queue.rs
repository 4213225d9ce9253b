//! Admission queue and execution driver
//!
//! Every admitted job gets one supervised execution unit. Units wait on a
//! counting gate of capacity N, so at most N downloader calls run at once.
//! Waiters are not promised FIFO order.
//!
//! Every job's cancellation signal is a child of the queue's shutdown
//! token: [`JobQueue::shutdown`] cancels all of them, then waits (bounded)
//! for the units to drain.

use aarc_common::events::{JobPayload, JobSnapshot, JobStatus};
use aarc_common::human_time::format_duration;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::JobError;
use crate::models::{Job, JobId};
use crate::services::downloader::{Artifact, DownloadError, DownloadRequest, Downloader};
use crate::services::error_classifier::{ErrorClassifier, GENERIC_FAILURE_MESSAGE};
use crate::services::finalizer::OutputFinalizer;
use crate::services::progress::{self, PhaseProgress, FINALIZATION_START, RUNNING_START};
use crate::services::JobRegistry;

/// Label used when the downloader finished without producing a file
pub const NOTHING_FOUND_MESSAGE: &str = "No downloadable audio was found at this URL";

/// Label used when the produced file could not be placed
pub const FINALIZE_FAILED_MESSAGE: &str = "Could not save the audio file";

/// Bounded-concurrency job scheduler
pub struct JobQueue {
    unit: ExecutionUnit,
    capacity: usize,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// Shared handles one execution unit needs; cloned into every spawned task
#[derive(Clone)]
struct ExecutionUnit {
    registry: Arc<JobRegistry>,
    gate: Arc<Semaphore>,
    downloader: Arc<dyn Downloader>,
    classifier: Arc<dyn ErrorClassifier>,
    finalizer: Arc<dyn OutputFinalizer>,
}

impl JobQueue {
    /// `max_concurrent` below 1 is treated as 1
    pub fn new(
        registry: Arc<JobRegistry>,
        max_concurrent: usize,
        downloader: Arc<dyn Downloader>,
        classifier: Arc<dyn ErrorClassifier>,
        finalizer: Arc<dyn OutputFinalizer>,
    ) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            unit: ExecutionUnit {
                registry,
                gate: Arc::new(Semaphore::new(capacity)),
                downloader,
                classifier,
                finalizer,
            },
            capacity,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.unit.registry
    }

    /// Configured maximum of concurrently running downloads
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free admission slots right now
    pub fn available_slots(&self) -> usize {
        self.unit.gate.available_permits()
    }

    /// Root token; cancelled on shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Build a job whose cancellation signal is tied to queue shutdown
    pub fn new_job(&self, payload: JobPayload) -> Job {
        Job::with_cancel_token(payload, self.shutdown.child_token())
    }

    /// Register `job` and schedule its execution unit
    ///
    /// Returns `false` (and schedules nothing) if a job with the same id is
    /// already registered. Never waits for a slot.
    pub fn admit(&self, job: Job) -> bool {
        let id = job.id();
        let cancel = job.cancel_token();
        let payload = job.payload().clone();

        if !self.unit.registry.insert(job) {
            debug!(job_id = %id, "Duplicate admission ignored");
            return false;
        }

        self.unit.report(id, JobStatus::Queued, Some(0), "Queued");
        self.tracker
            .spawn(self.unit.clone().execute(id, payload, cancel));
        true
    }

    /// Create and admit a job for `payload`
    pub fn submit(&self, payload: JobPayload) -> Result<JobSnapshot, JobError> {
        if self.is_shutting_down() {
            return Err(JobError::Conflict(
                "Service is shutting down; no new jobs accepted".to_string(),
            ));
        }

        let job = self.new_job(payload);
        let id = job.id();
        if !self.admit(job) {
            return Err(JobError::Conflict(format!("Job {} already exists", id)));
        }
        info!(job_id = %id, "Job submitted");

        self.unit.registry.get(id).ok_or(JobError::NotFound(id))
    }

    pub fn cancel(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        self.unit.registry.request_cancel(id)
    }

    pub fn remove(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        self.unit.registry.remove(id)
    }

    /// Cancel every job and wait up to `drain_timeout` for units to finish
    ///
    /// Returns whether all units finished in time.
    pub async fn shutdown(&self, drain_timeout: Duration) -> bool {
        info!(
            in_flight = self.tracker.len(),
            "Shutting down job queue"
        );
        self.shutdown.cancel();
        self.tracker.close();

        match tokio::time::timeout(drain_timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("All jobs drained");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.tracker.len(),
                    timeout_secs = drain_timeout.as_secs(),
                    "Drain timeout elapsed with jobs still running"
                );
                false
            }
        }
    }
}

impl ExecutionUnit {
    /// Report a status change; failures here mean the job vanished and are logged only
    fn report(&self, id: JobId, status: JobStatus, progress: Option<u8>, label: impl Into<String>) {
        if let Err(e) = self.registry.report_status(id, status, progress, label) {
            warn!(job_id = %id, status = %status, error = %e, "Status report rejected");
        }
    }

    async fn execute(self, id: JobId, payload: JobPayload, cancel: CancellationToken) {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(job_id = %id, "Job cancelled while queued");
                self.report(id, JobStatus::Cancelled, None, "Cancelled");
                return;
            }
            permit = self.gate.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(job_id = %id, "Admission gate closed");
                    self.report(id, JobStatus::Cancelled, None, "Cancelled");
                    return;
                }
            },
        };

        // The signal may have fired while the permit was being handed over
        if cancel.is_cancelled() {
            info!(job_id = %id, "Job cancelled while queued");
            self.report(id, JobStatus::Cancelled, None, "Cancelled");
            drop(permit);
            return;
        }

        self.run(id, payload, cancel).await;
        drop(permit);
    }

    async fn run(&self, id: JobId, payload: JobPayload, cancel: CancellationToken) {
        let started = Instant::now();
        info!(job_id = %id, url = %payload.url, format = %payload.format.as_str(), "Job started");
        self.report(id, JobStatus::Running, Some(RUNNING_START), "Starting download");

        let registry = self.registry.clone();
        let on_progress = move |report: PhaseProgress| {
            let (value, label) = progress::aggregate(report);
            registry.report_progress(id, value, label);
        };

        let request = DownloadRequest { job_id: id, payload };
        let outcome = AssertUnwindSafe(self.downloader.run(&request, cancel.clone(), &on_progress))
            .catch_unwind()
            .await;

        if cancel.is_cancelled() {
            if let Ok(Ok(Some(artifact))) = outcome {
                discard_artifact(&artifact).await;
            }
            info!(job_id = %id, "Job cancelled while running");
            self.report(id, JobStatus::Cancelled, None, "Cancelled");
            return;
        }

        match outcome {
            Ok(Ok(Some(artifact))) => self.finalize(id, artifact, &cancel, started).await,
            Ok(Ok(None)) => {
                warn!(job_id = %id, "Downloader produced no artifact");
                self.report(id, JobStatus::Failed, None, NOTHING_FOUND_MESSAGE);
            }
            Ok(Err(DownloadError::Cancelled)) => {
                info!(job_id = %id, "Downloader stopped on cancellation");
                self.report(id, JobStatus::Cancelled, None, "Cancelled");
            }
            Ok(Err(e)) => self.fail(id, &e.raw_lines()),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(job_id = %id, panic = %message, "Downloader panicked");
                self.report(id, JobStatus::Failed, None, GENERIC_FAILURE_MESSAGE);
            }
        }
    }

    async fn finalize(
        &self,
        id: JobId,
        artifact: Artifact,
        cancel: &CancellationToken,
        started: Instant,
    ) {
        self.registry
            .report_progress(id, FINALIZATION_START + 5, "Saving audio file");

        match self.finalizer.place(&artifact).await {
            Ok(path) => {
                if cancel.is_cancelled() {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        warn!(job_id = %id, path = %path.display(), error = %e, "Failed to remove output of cancelled job");
                    }
                    info!(job_id = %id, "Job cancelled during finalization");
                    self.report(id, JobStatus::Cancelled, None, "Cancelled");
                    return;
                }

                let elapsed = format_duration(started.elapsed());
                info!(job_id = %id, path = %path.display(), elapsed = %elapsed, "Job completed");
                self.report(
                    id,
                    JobStatus::Completed,
                    Some(100),
                    format!("Completed in {}", elapsed),
                );
            }
            Err(e) => {
                error!(job_id = %id, path = %artifact.path.display(), error = %e, "Failed to place audio file");
                discard_artifact(&artifact).await;
                self.report(id, JobStatus::Failed, None, FINALIZE_FAILED_MESSAGE);
            }
        }
    }

    fn fail(&self, id: JobId, raw_lines: &[String]) {
        let classification = self.classifier.classify(raw_lines);
        if classification.is_known {
            warn!(job_id = %id, reason = %classification.safe_message, "Download failed");
        } else {
            error!(job_id = %id, detail = %classification.raw_detail, "Download failed with unrecognized error");
        }
        self.report(id, JobStatus::Failed, None, classification.safe_message);
    }
}

/// Best-effort removal of a produced file and its scratch directory
async fn discard_artifact(artifact: &Artifact) {
    remove_quietly(&artifact.path, false).await;
    if let Some(work_dir) = &artifact.work_dir {
        remove_quietly(work_dir, true).await;
    }
}

async fn remove_quietly(path: &Path, dir: bool) {
    let result = if dir {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    if let Err(e) = result {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "Cleanup failed");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
