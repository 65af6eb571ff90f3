// src/handlers/output.rs
use super::job_error_response;
use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

#[derive(Deserialize)]
pub struct ArtifactQuery {
    pub index: Option<usize>,
}

/// GET /api/job/:job_id/artifact/:kind[?index=n] - Stream one produced file
async fn download_artifact(
    Path((job_id, kind)): Path<(String, String)>,
    Query(query): Query<ArtifactQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    let path = match state.job_manager.artifact_path(&job_id, &kind, query.index).await {
        Ok(path) => path,
        Err(e) => return job_error_response(e),
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(job_id = %job_id, "Artifact file missing: {}", path.display());
            return (StatusCode::NOT_FOUND, "Artifact file not found").into_response();
        }
        Err(e) => {
            tracing::error!("Failed to open artifact for download: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("artifact");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&path))
        .header(header::CONTENT_DISPOSITION, format!("inline; filename=\"{}\"", filename))
        .header(header::CACHE_CONTROL, "private, max-age=60")
        .body(axum::body::Body::from_stream(ReaderStream::new(file)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn content_type_for(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

pub fn output_routes() -> Router {
    Router::new().route("/api/job/:job_id/artifact/:kind", get(download_artifact))
}
