//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use aarc_common::events::JobStatus;

use crate::AppState;

/// Job counts by coarse state
#[derive(Debug, Serialize)]
pub struct JobCounts {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("aarc-dl")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub jobs: JobCounts,
    /// Live observer connections
    pub observers: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let registry = state.queue.registry();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "aarc-dl".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        jobs: JobCounts {
            total: registry.len(),
            queued: registry.count_in(JobStatus::Queued),
            running: registry.count_in(JobStatus::Running),
        },
        observers: state.hub.connection_count(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
