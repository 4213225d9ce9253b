//! Runtime configuration for aarc-dl
//!
//! Each setting resolves with priority command line → environment →
//! TOML → compiled default. Command-line and environment values arrive
//! together through [`CliOverrides`] (clap reads both).

use aarc_common::config::{load_toml_config_or_default, resolve_root_folder, TomlConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5780;
pub const DEFAULT_MAX_CONCURRENT: usize = 2;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_DOWNLOADER: &str = "yt-dlp";

/// Environment variable naming the downloader executable
pub const DOWNLOADER_ENV: &str = "AARC_DOWNLOADER";

/// Values supplied on the command line or through their `AARC_*` variables
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub root_folder: Option<PathBuf>,
    pub max_concurrent: Option<usize>,
}

/// Resolved service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub root_folder: PathBuf,
    /// Where finished audio files are placed
    pub output_dir: PathBuf,
    /// Parent of per-job scratch directories (absolute)
    pub work_dir: PathBuf,
    pub downloader_path: PathBuf,
    /// Admission gate capacity, at least 1
    pub max_concurrent_jobs: usize,
    pub sweep_interval: Duration,
    /// Age after which finished jobs are evicted
    pub retention: Duration,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn resolve(cli: &CliOverrides, toml: &TomlConfig) -> Self {
        let root_folder = absolute(&resolve_root_folder(cli.root_folder.as_deref(), toml));

        let host = cli
            .host
            .clone()
            .or_else(|| toml.server.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli.port.or(toml.server.port).unwrap_or(DEFAULT_PORT);

        let requested = cli
            .max_concurrent
            .or(toml.jobs.max_concurrent)
            .unwrap_or(DEFAULT_MAX_CONCURRENT);
        let max_concurrent_jobs = if requested < 1 {
            warn!(requested, "max_concurrent must be at least 1; using 1");
            1
        } else {
            requested
        };

        let sweep_interval = match toml.jobs.sweep_interval_secs {
            Some(0) => {
                warn!("sweep_interval_secs of 0 ignored; using default");
                DEFAULT_SWEEP_INTERVAL
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_SWEEP_INTERVAL,
        };
        let retention = toml
            .jobs
            .retention_secs
            .map(Duration::from_secs)
            .unwrap_or(sweep_interval);

        let downloader_path = std::env::var(DOWNLOADER_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| toml.jobs.downloader_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOADER));

        let output_dir = toml
            .jobs
            .output_dir
            .as_deref()
            .map(|dir| absolute(&root_folder.join(dir)))
            .unwrap_or_else(|| root_folder.join("archive"));

        Self {
            host,
            port,
            work_dir: root_folder.join("work"),
            output_dir,
            root_folder,
            downloader_path,
            max_concurrent_jobs,
            sweep_interval,
            retention,
            log_level: toml.logging.level.clone(),
            log_file: toml.logging.file.clone(),
        }
    }

    /// `host:port` for binding
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Retention as a chrono duration for timestamp arithmetic
    pub fn retention_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::MAX)
    }
}

/// Load the TOML file and resolve settings while `bootstrap` collects logs
///
/// The global subscriber is built from the resolved logging settings, so
/// anything logged before it exists goes to `bootstrap` instead.
pub fn load_with_bootstrap<S>(
    bootstrap: S,
    explicit: Option<&Path>,
    cli: &CliOverrides,
) -> ServiceConfig
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::with_default(bootstrap, || {
        let toml = load_toml_config_or_default(explicit);
        ServiceConfig::resolve(cli, &toml)
    })
}

/// Anchor a relative path at the current directory
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
