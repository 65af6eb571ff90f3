// src/handlers/mod.rs
pub mod jobs;
pub mod output;
pub mod upload;

use crate::error::JobError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde_json::json;

/// Every API route, expecting `Extension<Arc<AppState>>` to be layered on top
pub fn api_routes() -> Router {
    Router::new()
        .merge(jobs::job_routes())
        .merge(output::output_routes())
        .merge(upload::upload_routes())
}

/// Map a job error onto an HTTP status with a JSON body
pub fn job_error_response(error: JobError) -> Response {
    let status = match &error {
        JobError::Validation(_) => StatusCode::BAD_REQUEST,
        JobError::NotFound(_) | JobError::ArtifactNotFound { .. } => StatusCode::NOT_FOUND,
        JobError::NotCancellable { .. } => StatusCode::CONFLICT,
        JobError::Storage(_) | JobError::Serialization(_) | JobError::QueueClosed => {
            tracing::error!("Request failed: {}", error);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(json!({
            "status": "error",
            "message": error.to_string(),
        })),
    )
        .into_response()
}
