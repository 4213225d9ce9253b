//! Event types for the AARC observer channel
//!
//! Every event is serialized as a tagged envelope `{"kind": ..., "payload": ...}`
//! and pushed to connected observers by the broadcast hub.

mod job_types;

pub use job_types::{AudioFormat, JobPayload, JobSnapshot, JobStatus, JobStatusUpdate};

use serde::{Deserialize, Serialize};

/// AARC observer events
///
/// Serialized once per publish and delivered verbatim to every observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum AarcEvent {
    /// A job entered the registry (Queued)
    ///
    /// Carries the full job so observers that connected after creation
    /// still learn the job exists.
    JobAdmitted(JobSnapshot),

    /// A job's status, progress or label changed
    JobStatusUpdate(JobStatusUpdate),
}

impl AarcEvent {
    /// Envelope `kind` value, used for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            AarcEvent::JobAdmitted(_) => "JobAdmitted",
            AarcEvent::JobStatusUpdate(_) => "JobStatusUpdate",
        }
    }

    /// Serialize the envelope to JSON text
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
