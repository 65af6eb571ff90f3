// src/handlers/upload.rs
use super::job_error_response;
use crate::AppState;
use axum::{
    extract::{multipart::Multipart, DefaultBodyLimit, Extension},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde_json::json;
use std::sync::Arc;

/// Largest accepted reference image
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

pub fn upload_routes() -> Router {
    Router::new()
        .route("/api/upload", post(upload_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// POST /api/upload - Store a reference image; the returned `image_id` can
/// be passed when creating a job
async fn upload_image(Extension(state): Extension<Arc<AppState>>, mut multipart: Multipart) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Malformed upload: {}", e);
                return bad_request("Malformed multipart body");
            }
        };
        if field.name() != Some("file") {
            continue;
        }

        let filename = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return bad_request("No file selected"),
        };
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                tracing::error!("Failed to read upload '{}': {}", filename, e);
                return bad_request("Failed to read file");
            }
        };

        return match state.job_manager.save_upload(&filename, &data).await {
            Ok(uploaded) => (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "message": "File uploaded successfully",
                    "image_id": uploaded.image_id,
                    "filename": uploaded.filename,
                })),
            )
                .into_response(),
            Err(e) => job_error_response(e),
        };
    }

    bad_request("No file part in the request")
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "status": "error", "message": message })),
    )
        .into_response()
}
