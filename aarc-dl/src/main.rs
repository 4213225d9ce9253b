//! aarc-dl - Audio archive job service
//!
//! **Module Identity:**
//! - Name: aarc-dl (Archive Downloader)
//! - Port: 5780 (default)
//!
//! Accepts archive jobs over HTTP, runs at most N downloads at a time and
//! pushes every job status change to WebSocket observers.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use aarc_dl::config::{load_with_bootstrap, CliOverrides, ServiceConfig};
use aarc_dl::services::{
    BroadcastHub, CleanupSweeper, FsFinalizer, JobQueue, JobRegistry, PatternClassifier,
    YtDlpDownloader,
};
use aarc_dl::{build_router, AppState};

/// How long shutdown waits for in-flight jobs to wind down
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_LOG_FILTER: &str = "aarc_dl=info,aarc_common=info,tower_http=info";

/// Command-line arguments for aarc-dl
#[derive(Parser, Debug)]
#[command(name = "aarc-dl")]
#[command(about = "Audio archive job service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "AARC_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "AARC_HOST")]
    host: Option<String>,

    /// Root folder for archived audio and scratch space
    #[arg(short, long, env = "AARC_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Maximum number of downloads running at once
    #[arg(short = 'j', long, env = "AARC_MAX_CONCURRENT")]
    max_concurrent: Option<usize>,

    /// Explicit TOML config file
    #[arg(short, long, env = "AARC_CONFIG")]
    config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            host: self.host.clone(),
            port: self.port,
            root_folder: self.root_folder.clone(),
            max_concurrent: self.max_concurrent,
        }
    }
}

/// RUST_LOG wins, then the configured level, then the compiled default
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn init_tracing(config: &ServiceConfig) -> Result<()> {
    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(build_filter(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config warnings are printed to stderr before the configured subscriber exists
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(build_filter(DEFAULT_LOG_FILTER))
        .finish();
    let config = load_with_bootstrap(bootstrap, args.config.as_deref(), &args.overrides());

    init_tracing(&config)?;

    info!(
        "Starting aarc-dl (Audio Archive) v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Root folder: {}", config.root_folder.display());
    info!("Output folder: {}", config.output_dir.display());
    info!(
        max_concurrent = config.max_concurrent_jobs,
        downloader = %config.downloader_path.display(),
        "Job settings"
    );

    for dir in [&config.root_folder, &config.output_dir, &config.work_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let hub = BroadcastHub::new();
    let registry = Arc::new(JobRegistry::new(hub));
    let queue = Arc::new(JobQueue::new(
        registry.clone(),
        config.max_concurrent_jobs,
        Arc::new(YtDlpDownloader::new(
            config.downloader_path.clone(),
            config.work_dir.clone(),
        )),
        Arc::new(PatternClassifier::new()),
        Arc::new(FsFinalizer::new(config.output_dir.clone())),
    ));

    let shutdown = queue.shutdown_token();
    let sweeper = CleanupSweeper::new(registry, config.sweep_interval, config.retention_chrono())
        .spawn(shutdown.clone());

    let app = build_router(AppState::new(queue.clone()));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    queue.shutdown(DRAIN_TIMEOUT).await;
    if let Err(e) = sweeper.await {
        error!(error = %e, "Sweeper task ended abnormally");
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel `shutdown`
///
/// Cancelling first lets open observer sockets close so the server can
/// finish its graceful shutdown.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }

    shutdown.cancel();
}
