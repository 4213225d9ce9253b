//! Service modules for the archive job service
//!
//! Orchestration core (registry, queue, hub, sweeper, progress) plus the
//! collaborators it drives (downloader, error classifier, finalizer).

pub mod broadcast_hub;
pub mod downloader;
pub mod error_classifier;
pub mod finalizer;
pub mod job_queue;
pub mod job_registry;
pub mod progress;
pub mod sweeper;
pub mod ytdlp;

pub use broadcast_hub::{BroadcastHub, ConnectionId, ObserverSink, SinkError};
pub use downloader::{Artifact, DownloadError, DownloadRequest, Downloader, ProgressSink};
pub use error_classifier::{Classification, ErrorClassifier, PatternClassifier};
pub use finalizer::{FsFinalizer, OutputFinalizer};
pub use job_queue::JobQueue;
pub use job_registry::JobRegistry;
pub use progress::{DownloadPhase, PhaseProgress};
pub use sweeper::CleanupSweeper;
pub use ytdlp::YtDlpDownloader;
