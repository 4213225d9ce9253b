//! yt-dlp subprocess downloader
//!
//! Runs the external downloader once per job inside a per-job scratch
//! directory, translating its line-oriented output into phase progress.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::services::downloader::{
    Artifact, DownloadError, DownloadRequest, Downloader, ProgressSink,
};
use crate::services::progress::{DownloadPhase, PhaseProgress};

/// Error lines retained for classification
const MAX_ERROR_LINES: usize = 40;

/// Output filename template, relative to the scratch directory
const OUTPUT_TEMPLATE: &str = "%(title).200B [%(id)s].%(ext)s";

/// Downloader backed by the `yt-dlp` executable
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    program: PathBuf,
    work_root: PathBuf,
}

impl YtDlpDownloader {
    /// `program`: executable name or path; `work_root`: parent of per-job scratch dirs
    pub fn new(program: impl Into<PathBuf>, work_root: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            work_root: work_root.into(),
        }
    }

    fn build_command(&self, request: &DownloadRequest, work_dir: &Path) -> Command {
        let payload = &request.payload;
        let mut cmd = Command::new(&self.program);
        cmd.arg("--newline")
            .arg("--progress")
            .arg("--no-playlist")
            .arg("-x")
            .arg("--audio-format")
            .arg(payload.format.as_str());
        if let Some(quality) = payload.quality {
            cmd.arg("--audio-quality").arg(quality.to_string());
        }
        cmd.arg("-P")
            .arg(work_dir)
            .arg("-o")
            .arg(OUTPUT_TEMPLATE)
            .arg("--print")
            .arg("after_move:filepath")
            .arg("--")
            .arg(&payload.url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

async fn kill_and_clean(child: &mut Child, work_dir: &Path) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Downloader already exited");
    }
    remove_work_dir(work_dir).await;
}

async fn remove_work_dir(work_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(work_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %work_dir.display(), error = %e, "Failed to remove scratch directory");
        }
    }
}

/// Next newline-terminated line, decoded lossily
///
/// The downloader echoes titles and paths byte for byte, so its output is
/// not guaranteed to be UTF-8.
async fn next_line_lossy<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn run(
        &self,
        request: &DownloadRequest,
        cancel: CancellationToken,
        on_progress: &ProgressSink,
    ) -> Result<Option<Artifact>, DownloadError> {
        let work_dir = self.work_root.join(request.job_id.to_string());
        tokio::fs::create_dir_all(&work_dir).await?;

        if let Some(lyrics) = &request.payload.lyrics {
            debug!(job_id = %request.job_id, lines = lyrics.len(), "Lyrics supplied; left to tag writer");
        }

        let mut child = self
            .build_command(request, &work_dir)
            .spawn()
            .map_err(|source| DownloadError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;
        info!(job_id = %request.job_id, url = %request.payload.url, "Downloader started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("downloader stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("downloader stderr not captured"))?;

        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(MAX_ERROR_LINES);
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            loop {
                match next_line_lossy(&mut reader, &mut buf).await {
                    Ok(Some(line)) => {
                        if tail.len() == MAX_ERROR_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(error = %e, "Stopped reading downloader stderr");
                        break;
                    }
                }
            }
            Vec::from(tail)
        });

        let mut tracker = OutputTracker::default();
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    kill_and_clean(&mut child, &work_dir).await;
                    return Err(DownloadError::Cancelled);
                }
                line = next_line_lossy(&mut reader, &mut buf) => match line {
                    Ok(Some(line)) => {
                        if let Some(report) = tracker.observe(&line) {
                            on_progress(report);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(job_id = %request.job_id, error = %e, "Failed to read downloader output");
                        kill_and_clean(&mut child, &work_dir).await;
                        return Err(e.into());
                    }
                },
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                kill_and_clean(&mut child, &work_dir).await;
                return Err(DownloadError::Cancelled);
            }
            status = child.wait() => match status {
                Ok(status) => status,
                Err(e) => {
                    kill_and_clean(&mut child, &work_dir).await;
                    return Err(e.into());
                }
            },
        };
        let error_lines = stderr_task.await.unwrap_or_default();

        if !status.success() {
            remove_work_dir(&work_dir).await;
            return Err(DownloadError::Process {
                exit_code: status.code(),
                lines: error_lines,
            });
        }

        match tracker.artifact {
            Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => {
                Ok(Some(Artifact {
                    path,
                    work_dir: Some(work_dir),
                }))
            }
            _ => {
                remove_work_dir(&work_dir).await;
                Ok(None)
            }
        }
    }
}

/// Stateful interpreter of the downloader's stdout
#[derive(Debug, Default)]
pub struct OutputTracker {
    info_lines: u32,
    /// Final file path printed after the move stage
    pub artifact: Option<PathBuf>,
}

impl OutputTracker {
    /// Interpret one stdout line; returns a progress report if the line carries one
    pub fn observe(&mut self, line: &str) -> Option<PhaseProgress> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some((tag, rest)) = split_tag(line) else {
            if line.starts_with("Deleting original file") {
                return Some(PhaseProgress::new(DownloadPhase::PostProcessing, 1.0));
            }
            if Path::new(line).is_absolute() {
                self.artifact = Some(PathBuf::from(line));
            }
            return None;
        };

        match tag {
            "download" => parse_download_fraction(rest)
                .map(|fraction| PhaseProgress::new(DownloadPhase::Downloading, fraction)),
            "ExtractAudio" | "ffmpeg" => Some(PhaseProgress::new(DownloadPhase::PostProcessing, 0.3)),
            "Metadata" => Some(PhaseProgress::new(DownloadPhase::PostProcessing, 0.6)),
            "EmbedThumbnail" => Some(PhaseProgress::new(DownloadPhase::PostProcessing, 0.8)),
            "MoveFiles" | "FixupM4a" | "FixupM3u8" => {
                Some(PhaseProgress::new(DownloadPhase::PostProcessing, 0.9))
            }
            _ => {
                self.info_lines += 1;
                let fraction = (self.info_lines as f64 * 0.2).min(1.0);
                Some(PhaseProgress::new(DownloadPhase::PreProcessing, fraction))
            }
        }
    }
}

/// `"[tag] rest"` -> `("tag", "rest")`
fn split_tag(line: &str) -> Option<(&str, &str)> {
    let inner = line.strip_prefix('[')?;
    let end = inner.find(']')?;
    Some((&inner[..end], inner[end + 1..].trim()))
}

fn parse_download_fraction(rest: &str) -> Option<f64> {
    if rest.contains("has already been downloaded") {
        return Some(1.0);
    }
    let token = rest.split_whitespace().next()?;
    let percent: f64 = token.strip_suffix('%')?.parse().ok()?;
    Some(percent / 100.0)
}
