// src/handlers/jobs.rs
//! Job endpoints - create, list, status, cancel

use super::job_error_response;
use crate::jobs::CreateJobRequest;
use crate::models::JobId;
use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// POST /api/job - Create a video generation job
pub async fn create_job(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<CreateJobRequest>,
) -> impl IntoResponse {
    match state.job_manager.create_job(request).await {
        Ok(job_id) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "message": "Video generation started",
                "job_id": job_id,
            })),
        )
            .into_response(),
        Err(e) => job_error_response(e),
    }
}

/// GET /api/jobs?limit&offset - Newest jobs first
pub async fn list_jobs(
    Query(query): Query<ListJobsQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);
    match state.job_manager.list_jobs_page(limit, offset).await {
        Ok(jobs) => (StatusCode::OK, Json(json!({ "status": "success", "jobs": jobs }))).into_response(),
        Err(e) => job_error_response(e),
    }
}

/// GET /api/job/:job_id - Full job record
pub async fn get_job(
    Path(job_id): Path<JobId>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    match state.job_manager.get_job(&job_id).await {
        Ok(job) => (StatusCode::OK, Json(json!({ "status": "success", "job": job }))).into_response(),
        Err(e) => job_error_response(e),
    }
}

/// POST /api/jobs/:job_id/cancel - Cancel unless already finished
pub async fn cancel_job(
    Path(job_id): Path<JobId>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    match state.job_manager.cancel_job(&job_id).await {
        Ok(job) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "message": "Job cancelled",
                "job": job,
            })),
        )
            .into_response(),
        Err(e) => job_error_response(e),
    }
}

/// GET /api/renderer-version
pub async fn renderer_version(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    match state.job_manager.renderer_version().await {
        Ok(version) => (StatusCode::OK, Json(json!({ "status": "success", "version": version }))).into_response(),
        Err(e) => {
            tracing::warn!("Renderer version unavailable: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Routes for job management
pub fn job_routes() -> Router {
    Router::new()
        .route("/api/job", post(create_job))
        .route("/api/jobs", get(list_jobs))
        .route("/api/job/:job_id", get(get_job))
        .route("/api/jobs/:job_id/cancel", post(cancel_job))
        .route("/api/renderer-version", get(renderer_version))
}
