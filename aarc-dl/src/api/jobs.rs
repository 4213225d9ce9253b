//! Job API handlers
//!
//! POST /api/jobs, GET /api/jobs, GET /api/jobs/:id,
//! POST /api/jobs/:id/cancel, DELETE /api/jobs/:id

use aarc_common::events::{AudioFormat, JobPayload, JobSnapshot};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Highest accepted `quality` (0 is best)
pub const MAX_QUALITY: u8 = 10;

/// POST /api/jobs request
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub url: String,
    #[serde(default)]
    pub format: AudioFormat,
    #[serde(default)]
    pub quality: Option<u8>,
    #[serde(default)]
    pub lyrics: Option<Vec<String>>,
}

impl CreateJobRequest {
    fn into_payload(self) -> ApiResult<JobPayload> {
        let url = self.url.trim();
        let parsed = url::Url::parse(url)
            .map_err(|e| ApiError::BadRequest(format!("Invalid URL {:?}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::BadRequest(format!(
                "Unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(ApiError::BadRequest(format!("URL has no host: {}", url)));
        }

        if let Some(quality) = self.quality {
            if quality > MAX_QUALITY {
                return Err(ApiError::BadRequest(format!(
                    "quality must be between 0 and {}, got {}",
                    MAX_QUALITY, quality
                )));
            }
        }

        Ok(JobPayload {
            url: parsed.to_string(),
            format: self.format,
            quality: self.quality,
            lyrics: self.lyrics,
        })
    }
}

/// POST /api/jobs
///
/// Validates the request and admits a new job. Returns 201 with its state.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<JobSnapshot>)> {
    let payload = request.into_payload()?;
    let snapshot = state.queue.submit(payload)?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// GET /api/jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobSnapshot>> {
    Json(state.queue.registry().list())
}

/// GET /api/jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobSnapshot>> {
    state
        .queue
        .registry()
        .get(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {}", id)))
}

/// POST /api/jobs/:id/cancel
///
/// 202: the signal fired; the job reports Cancelled once its unit observes it.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<JobSnapshot>)> {
    let snapshot = state.queue.cancel(id)?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// DELETE /api/jobs/:id
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.queue.remove(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Build job routes
pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/api/jobs", post(create_job).get(list_jobs))
        .route("/api/jobs/:id", get(get_job).delete(delete_job))
        .route("/api/jobs/:id/cancel", post(cancel_job))
}
