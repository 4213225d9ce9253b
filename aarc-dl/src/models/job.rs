//! Job entity
//!
//! One tracked request to archive a remote media resource as a local audio
//! file. Status moves only along the lifecycle graph encoded in
//! [`JobStatus::can_transition_to`]; progress never decreases while Running.

use aarc_common::events::{JobPayload, JobSnapshot, JobStatus};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::JobError;

/// Opaque, registry-unique job identifier
pub type JobId = Uuid;

/// Unit-of-work record
#[derive(Debug)]
pub struct Job {
    id: JobId,
    status: JobStatus,
    progress: u8,
    progress_label: String,
    payload: JobPayload,
    created_at: DateTime<Utc>,
    /// One-shot cooperative cancellation signal; clones share one state
    cancel: CancellationToken,
}

impl Job {
    /// Create a job in WaitingForQueue with its own cancellation signal
    pub fn new(payload: JobPayload) -> Self {
        Self::with_cancel_token(payload, CancellationToken::new())
    }

    /// Create a job whose cancellation signal is supplied by the caller
    ///
    /// The queue passes a child of its shutdown token so that shutdown
    /// cancels every job.
    pub fn with_cancel_token(payload: JobPayload, cancel: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::WaitingForQueue,
            progress: 0,
            progress_label: String::from("Waiting for queue"),
            payload,
            created_at: Utc::now(),
            cancel,
        }
    }

    /// Override the creation timestamp (retention accounting)
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Override the identifier
    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn progress_label(&self) -> &str {
        &self.progress_label
    }

    pub fn payload(&self) -> &JobPayload {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Handle on the job's cancellation signal for the execution unit
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Trigger the cancellation signal
    ///
    /// Returns `false` if it had already fired; the second trigger changes nothing.
    pub fn request_cancel(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.cancel.cancel();
        true
    }

    /// Apply a status transition
    ///
    /// `progress` of `None` keeps the current value (terminal failure and
    /// cancellation freeze the bar where it stopped).
    pub fn transition(
        &mut self,
        next: JobStatus,
        progress: Option<u8>,
        label: impl Into<String>,
    ) -> Result<(), JobError> {
        if !self.status.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if let Some(progress) = progress {
            self.progress = progress.min(100);
        }
        self.progress_label = label.into();
        Ok(())
    }

    /// Record a progress value while Running
    ///
    /// Values not strictly greater than the stored progress are dropped, as
    /// are reports outside the Running state. Returns whether it was applied.
    pub fn advance_progress(&mut self, progress: u8, label: impl Into<String>) -> bool {
        let progress = progress.min(100);
        if self.status != JobStatus::Running || progress <= self.progress {
            return false;
        }
        self.progress = progress;
        self.progress_label = label.into();
        true
    }

    /// Time since creation, relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            status: self.status,
            progress: self.progress,
            progress_label: self.progress_label.clone(),
            payload: self.payload.clone(),
            created_at: self.created_at,
            cancel_requested: self.cancel.is_cancelled(),
        }
    }
}
