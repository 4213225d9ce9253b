//! Output finalization
//!
//! Moves a produced audio file into the managed output directory.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::services::downloader::Artifact;

/// Highest numeric suffix tried before giving up
const MAX_SUFFIX: u32 = 10_000;

/// Output placement collaborator
#[async_trait]
pub trait OutputFinalizer: Send + Sync {
    /// Place `artifact` in its final location and return that path
    async fn place(&self, artifact: &Artifact) -> io::Result<PathBuf>;
}

/// Filesystem finalizer: move into `output_dir`, never overwriting
#[derive(Debug, Clone)]
pub struct FsFinalizer {
    output_dir: PathBuf,
}

impl FsFinalizer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// `name`, then `stem (1).ext`, `stem (2).ext`, ...
fn candidate_names(file_name: &str) -> impl Iterator<Item = String> + '_ {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

    std::iter::once(file_name.to_string()).chain((1..MAX_SUFFIX).map(move |n| match &ext {
        Some(ext) => format!("{} ({}).{}", stem, n, ext),
        None => format!("{} ({})", stem, n),
    }))
}

/// Reserve the first free candidate name in `dir`
///
/// The name is claimed by creating an empty placeholder with `create_new`,
/// so two concurrent placements can never pick the same target.
async fn claim_target(dir: &Path, file_name: &str) -> io::Result<PathBuf> {
    for name in candidate_names(file_name) {
        let candidate = dir.join(name);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {}", file_name),
    ))
}

/// Move `from` over the placeholder at `to`
async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) => {
            // Rename fails across filesystems
            debug!(error = %e, "Rename failed, copying instead");
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}

#[cfg(unix)]
async fn set_readable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).await
}

#[cfg(not(unix))]
async fn set_readable(_path: &Path) -> io::Result<()> {
    Ok(())
}

#[async_trait]
impl OutputFinalizer for FsFinalizer {
    async fn place(&self, artifact: &Artifact) -> io::Result<PathBuf> {
        let file_name = artifact
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("artifact has no file name: {}", artifact.path.display()),
                )
            })?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let target = claim_target(&self.output_dir, &file_name).await?;
        if let Err(e) = move_file(&artifact.path, &target).await {
            if let Err(cleanup) = tokio::fs::remove_file(&target).await {
                warn!(path = %target.display(), error = %cleanup, "Failed to release claimed name");
            }
            return Err(e);
        }
        set_readable(&target).await?;

        if let Some(work_dir) = &artifact.work_dir {
            if let Err(e) = tokio::fs::remove_dir_all(work_dir).await {
                warn!(dir = %work_dir.display(), error = %e, "Failed to remove scratch directory");
            }
        }

        Ok(target)
    }
}
