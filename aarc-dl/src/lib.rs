//! aarc-dl library interface
//!
//! Exposes the orchestration core, its collaborators and the HTTP surface
//! so the binary and integration tests share one wiring.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::services::{BroadcastHub, JobQueue};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Admission queue; also the way to reach the job registry
    pub queue: Arc<JobQueue>,
    /// Observer fan-out shared with the registry
    pub hub: BroadcastHub,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        let hub = queue.registry().hub().clone();
        Self {
            queue,
            hub,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::job_routes())
        .merge(api::ws_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
