//! Job wire types shared by the service and its observers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job lifecycle state
///
/// ```text
/// WaitingForQueue -> Queued -> Running -> Completed
///                      |          |-----> Failed
///                      |          `-----> Cancelled
///                      `----------------> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Created, not yet admitted into the registry
    WaitingForQueue,
    /// Admitted, waiting for a concurrency slot
    Queued,
    /// Holding a slot, downloader running
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    /// Completed, Cancelled and Failed accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed
        )
    }

    /// Whether `self -> next` is an edge of the lifecycle graph
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (WaitingForQueue, Queued)
                | (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::WaitingForQueue => "WaitingForQueue",
            JobStatus::Queued => "Queued",
            JobStatus::Running => "Running",
            JobStatus::Completed => "Completed",
            JobStatus::Cancelled => "Cancelled",
            JobStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Target audio container/codec handed to the downloader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    M4a,
    Opus,
    Vorbis,
    Flac,
    Wav,
}

impl AudioFormat {
    /// Name understood by the downloader's `--audio-format` switch
    pub fn as_str(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Opus => "opus",
            AudioFormat::Vorbis => "vorbis",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
        }
    }
}

/// Media target and per-job configuration
///
/// Opaque to the orchestration core beyond being passed to the downloader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Remote media URL
    pub url: String,

    /// Target audio format
    #[serde(default)]
    pub format: AudioFormat,

    /// Downloader audio quality (0 = best, 10 = worst)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,

    /// Optional lyric lines to embed after download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<Vec<String>>,
}

/// Full observer-facing state of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: Uuid,
    pub status: JobStatus,
    /// 0-100
    pub progress: u8,
    pub progress_label: String,
    pub payload: JobPayload,
    pub created_at: DateTime<Utc>,
    /// Set once cancellation has been requested (may precede the Cancelled status)
    pub cancel_requested: bool,
}

/// Incremental status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusUpdate {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub progress_label: String,
}

impl From<&JobSnapshot> for JobStatusUpdate {
    fn from(snapshot: &JobSnapshot) -> Self {
        Self {
            id: snapshot.id,
            status: snapshot.status,
            progress: snapshot.progress,
            progress_label: snapshot.progress_label.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 6] = [
        JobStatus::WaitingForQueue,
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Cancelled,
        JobStatus::Failed,
    ];

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for from in ALL.iter().copied().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{} -> {} must be rejected", from, to);
            }
        }
    }

    #[test]
    fn queued_cannot_complete_or_fail_without_running() {
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn waiting_only_moves_to_queued() {
        let targets: Vec<_> = ALL
            .into_iter()
            .filter(|s| JobStatus::WaitingForQueue.can_transition_to(*s))
            .collect();
        assert_eq!(targets, vec![JobStatus::Queued]);
    }

    #[test]
    fn payload_defaults_format_to_mp3() {
        let payload: JobPayload =
            serde_json::from_str(r#"{"url":"http://example.com/a"}"#).unwrap();
        assert_eq!(payload.format, AudioFormat::Mp3);
        assert!(payload.lyrics.is_none());
    }
}
