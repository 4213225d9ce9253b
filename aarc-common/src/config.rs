//! Bootstrap configuration loading and root folder resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: the service logs a
//! warning and starts on compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "AARC_ROOT_FOLDER";

/// Environment variable naming an explicit config file
pub const CONFIG_FILE_ENV: &str = "AARC_CONFIG";

/// Bootstrap configuration loaded from TOML file
///
/// Cannot change while the service runs; restart to pick up edits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Root folder for service data (archive output, scratch space)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Job orchestration configuration
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

/// Job orchestration configuration (all optional, compiled defaults apply)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
    /// Maximum number of simultaneously running downloads
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// Cleanup sweep interval in seconds
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,

    /// Retention of terminal jobs in seconds (defaults to the sweep interval)
    #[serde(default)]
    pub retention_secs: Option<u64>,

    /// Downloader executable (name on PATH or absolute path)
    #[serde(default)]
    pub downloader_path: Option<PathBuf>,

    /// Directory receiving finished audio files
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load TOML configuration from an explicit path
///
/// Returns `Error::Config` if the file exists but cannot be read or parsed.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load TOML configuration, degrading to defaults
///
/// Looks at `explicit` first, then `AARC_CONFIG`, then the platform config
/// locations. Never fails: problems are logged and defaults returned.
pub fn load_toml_config_or_default(explicit: Option<&Path>) -> TomlConfig {
    let candidate = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from))
        .or_else(|| config_file_path().ok());

    let Some(path) = candidate else {
        info!("No config file found, using compiled defaults");
        return TomlConfig::default();
    };

    match load_toml_config(&path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{}; using compiled defaults", e);
            TomlConfig::default()
        }
    }
}

/// Root folder resolution following the priority order in the module docs
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Get default configuration file path for the platform
pub fn config_file_path() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("aarc").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/aarc/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/aarc (or /var/lib/aarc for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("aarc"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/aarc"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("aarc"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/aarc"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("aarc"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\aarc"))
    } else {
        PathBuf::from("./aarc_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_parses_to_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn jobs_section_is_optional_per_field() {
        let config: TomlConfig = toml::from_str(
            r#"
            [jobs]
            max_concurrent = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.jobs.max_concurrent, Some(4));
        assert_eq!(config.jobs.sweep_interval_secs, None);
    }

    #[test]
    fn default_root_folder_is_not_empty() {
        assert!(!default_root_folder().as_os_str().is_empty());
    }
}
