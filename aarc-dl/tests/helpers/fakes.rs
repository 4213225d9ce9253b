//! Test doubles for the downloader, finalizer and observer collaborators

use aarc_dl::services::{
    Artifact, DownloadError, DownloadRequest, Downloader, ObserverSink, OutputFinalizer,
    PhaseProgress, ProgressSink, SinkError,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// What every call to a [`FakeDownloader`] does once it is allowed to proceed
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Report each progress value, then produce an artifact
    Succeed { progress: Vec<PhaseProgress> },
    /// Finish without producing anything
    NothingFound,
    /// Exit with these raw error lines
    Fail(Vec<String>),
    /// Report that the download stopped on cancellation
    Cancelled,
    Panic,
}

/// Scripted downloader with call and concurrency counters
///
/// When built with [`FakeDownloader::gated`], each call first waits for a
/// permit from [`FakeDownloader::release`]. A cancellation during that
/// wait makes the call return a process error, as a killed child would.
/// [`FakeDownloader::gated_cancellable`] returns `DownloadError::Cancelled`
/// instead.
pub struct FakeDownloader {
    behaviour: Behaviour,
    gate: Option<Semaphore>,
    honour_cancel: bool,
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeDownloader {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            gate: None,
            honour_cancel: false,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        })
    }

    pub fn gated(behaviour: Behaviour) -> Arc<Self> {
        Self::with_gate(behaviour, false)
    }

    pub fn gated_cancellable(behaviour: Behaviour) -> Arc<Self> {
        Self::with_gate(behaviour, true)
    }

    fn with_gate(behaviour: Behaviour, honour_cancel: bool) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            gate: Some(Semaphore::new(0)),
            honour_cancel,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(Behaviour::Succeed {
            progress: Vec::new(),
        })
    }

    /// Let `n` held calls proceed
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn run(
        &self,
        request: &DownloadRequest,
        cancel: CancellationToken,
        on_progress: &ProgressSink,
    ) -> Result<Option<Artifact>, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let _guard = RunningGuard(&self.running);

        if let Some(gate) = &self.gate {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if self.honour_cancel {
                        return Err(DownloadError::Cancelled);
                    }
                    return Err(DownloadError::Process {
                        exit_code: Some(-9),
                        lines: vec!["ERROR: interrupted by signal".to_string()],
                    });
                }
                permit = gate.acquire() => {
                    if let Ok(permit) = permit {
                        permit.forget();
                    }
                }
            }
        }

        match &self.behaviour {
            Behaviour::Succeed { progress } => {
                for report in progress {
                    on_progress(*report);
                    tokio::task::yield_now().await;
                }
                Ok(Some(Artifact {
                    path: PathBuf::from(format!("/scratch/{}.mp3", request.job_id)),
                    work_dir: None,
                }))
            }
            Behaviour::NothingFound => Ok(None),
            Behaviour::Fail(lines) => Err(DownloadError::Process {
                exit_code: Some(1),
                lines: lines.clone(),
            }),
            Behaviour::Cancelled => Err(DownloadError::Cancelled),
            Behaviour::Panic => panic!("downloader exploded"),
        }
    }
}

/// Finalizer that records placements without touching the filesystem
///
/// A [`StubFinalizer::held`] finalizer waits inside `place` until
/// [`StubFinalizer::release`] is called.
#[derive(Default)]
pub struct StubFinalizer {
    pub fail: bool,
    gate: Option<Semaphore>,
    entered: AtomicUsize,
    placed: Mutex<Vec<PathBuf>>,
}

impl StubFinalizer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn held() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Default::default()
        }
    }

    /// Let `n` held placements finish
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Number of `place` calls started so far
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn placed(&self) -> Vec<PathBuf> {
        self.placed.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutputFinalizer for StubFinalizer {
    async fn place(&self, artifact: &Artifact) -> std::io::Result<PathBuf> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if self.fail {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only archive",
            ));
        }
        let target = PathBuf::from("/archive").join(artifact.path.file_name().unwrap_or_default());
        self.placed.lock().unwrap().push(target.clone());
        Ok(target)
    }
}

/// Observer sink that keeps every message it accepts
pub struct RecordingSink {
    open: AtomicBool,
    fail: bool,
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            open: AtomicBool::new(true),
            fail: false,
            messages: Mutex::new(Vec::new()),
        })
    }

    /// A sink whose every send fails at the transport level
    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            open: AtomicBool::new(true),
            fail: true,
            messages: Mutex::new(Vec::new()),
        })
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    /// Messages parsed as JSON
    pub fn events(&self) -> Vec<serde_json::Value> {
        self.messages()
            .iter()
            .map(|m| serde_json::from_str(m).unwrap())
            .collect()
    }
}

#[async_trait]
impl ObserverSink for RecordingSink {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, message: Arc<str>) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Transport("connection reset".to_string()));
        }
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}
