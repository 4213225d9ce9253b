//! Job registry
//!
//! Owns every `Job`. All status and progress mutations go through
//! [`JobRegistry::report_status`] / [`JobRegistry::report_progress`], which
//! also publish the change to the broadcast hub.

use aarc_common::events::{AarcEvent, JobSnapshot, JobStatus, JobStatusUpdate};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::JobError;
use crate::models::{Job, JobId};
use crate::services::BroadcastHub;

/// Thread-safe map of all known jobs
pub struct JobRegistry {
    jobs: DashMap<JobId, Job>,
    hub: BroadcastHub,
}

impl JobRegistry {
    pub fn new(hub: BroadcastHub) -> Self {
        Self {
            jobs: DashMap::new(),
            hub,
        }
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Insert a job; `false` if the id is already present
    pub fn insert(&self, job: Job) -> bool {
        match self.jobs.entry(job.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(job);
                true
            }
        }
    }

    pub fn get(&self, id: JobId) -> Option<JobSnapshot> {
        self.jobs.get(&id).map(|job| job.snapshot())
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    /// All jobs, oldest first
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<JobSnapshot> = self.jobs.iter().map(|job| job.snapshot()).collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of jobs currently in `status`
    pub fn count_in(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|job| job.status() == status).count()
    }

    pub fn cancel_token(&self, id: JobId) -> Option<CancellationToken> {
        self.jobs.get(&id).map(|job| job.cancel_token())
    }

    /// Trigger a job's cancellation signal
    ///
    /// Conflict if cancellation was already requested or the job has
    /// already finished. The status change itself is reported by the job's
    /// execution unit once it observes the signal.
    pub fn request_cancel(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        // Exclusive shard lock: concurrent requests cannot both win
        let job = self.jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;

        if job.is_terminal() {
            return Err(JobError::Conflict(format!(
                "Job {} already finished ({})",
                id,
                job.status()
            )));
        }
        if !job.request_cancel() {
            return Err(JobError::Conflict(format!(
                "Cancellation already requested for job {}",
                id
            )));
        }

        info!(job_id = %id, status = %job.status(), "Cancellation requested");
        Ok(job.snapshot())
    }

    /// Remove a terminal job at the client's request
    pub fn remove(&self, id: JobId) -> Result<JobSnapshot, JobError> {
        if let Some((_, job)) = self.jobs.remove_if(&id, |_, job| job.is_terminal()) {
            info!(job_id = %id, "Job removed");
            return Ok(job.snapshot());
        }

        match self.jobs.get(&id) {
            Some(job) => Err(JobError::Conflict(format!(
                "Job {} is still {}; cancel it and wait for it to finish first",
                id,
                job.status()
            ))),
            None => Err(JobError::NotFound(id)),
        }
    }

    /// Apply a status transition and broadcast it
    ///
    /// Publishes a status-update event for every transition and, for the
    /// transition into Queued, a job-admitted event carrying the full job.
    pub fn report_status(
        &self,
        id: JobId,
        status: JobStatus,
        progress: Option<u8>,
        label: impl Into<String>,
    ) -> Result<JobSnapshot, JobError> {
        let snapshot = {
            let mut job = self.jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;
            job.transition(status, progress, label)?;
            job.snapshot()
        };

        debug!(
            job_id = %id,
            status = %snapshot.status,
            progress = snapshot.progress,
            label = %snapshot.progress_label,
            "Job status changed"
        );

        if status == JobStatus::Queued {
            self.hub.publish(&AarcEvent::JobAdmitted(snapshot.clone()));
        }
        self.hub
            .publish(&AarcEvent::JobStatusUpdate(JobStatusUpdate::from(&snapshot)));

        Ok(snapshot)
    }

    /// Record a Running job's progress; lower or equal values are dropped
    ///
    /// Returns whether the value was applied (and broadcast).
    pub fn report_progress(&self, id: JobId, progress: u8, label: impl Into<String>) -> bool {
        let update = {
            let Some(mut job) = self.jobs.get_mut(&id) else {
                return false;
            };
            if !job.advance_progress(progress, label) {
                return false;
            }
            JobStatusUpdate {
                id,
                status: job.status(),
                progress: job.progress(),
                progress_label: job.progress_label().to_string(),
            }
        };

        self.hub.publish(&AarcEvent::JobStatusUpdate(update));
        true
    }

    /// Evict terminal jobs older than `retention` as of `now`
    ///
    /// Non-terminal jobs are never evicted regardless of age. Dropping an
    /// evicted job releases its cancellation signal.
    pub fn sweep_expired(&self, now: DateTime<Utc>, retention: chrono::Duration) -> Vec<JobId> {
        let expired: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|job| job.is_terminal() && job.age(now) > retention)
            .map(|job| job.id())
            .collect();

        let mut evicted = Vec::with_capacity(expired.len());
        for id in expired {
            if self
                .jobs
                .remove_if(&id, |_, job| job.is_terminal())
                .is_some()
            {
                evicted.push(id);
            } else {
                warn!(job_id = %id, "Expired job vanished or changed before eviction");
            }
        }
        evicted
    }
}
