//! Downloader collaborator interface
//!
//! The orchestration core never acquires or transcodes media itself; it
//! drives an implementation of [`Downloader`] and reacts to its outcome.

use aarc_common::events::JobPayload;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::JobId;
use crate::services::progress::PhaseProgress;

/// Synchronous progress notification sink handed to the downloader
pub type ProgressSink = dyn Fn(PhaseProgress) + Send + Sync;

/// What to download
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub job_id: JobId,
    pub payload: JobPayload,
}

/// A produced audio file awaiting finalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Produced file
    pub path: PathBuf,
    /// Per-job scratch directory to remove after the file is placed
    pub work_dir: Option<PathBuf>,
}

/// Downloader failure
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("downloader exited with status {exit_code:?}")]
    Process {
        exit_code: Option<i32>,
        /// Raw error output, oldest first
        lines: Vec<String>,
    },

    #[error("downloader I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Raw text for the error classifier
    pub fn raw_lines(&self) -> Vec<String> {
        match self {
            DownloadError::Process { lines, .. } if !lines.is_empty() => lines.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Media acquisition collaborator
///
/// `Ok(None)` means the run succeeded but produced nothing usable.
/// Implementations should return promptly once `cancel` fires.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn run(
        &self,
        request: &DownloadRequest,
        cancel: CancellationToken,
        on_progress: &ProgressSink,
    ) -> Result<Option<Artifact>, DownloadError>;
}
