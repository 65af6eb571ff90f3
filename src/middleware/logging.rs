use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Log every HTTP request with a request id, its route and its latency.
/// Events emitted by the handler are recorded inside the request span.
pub async fn request_logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4();
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());

    let span = tracing::info_span!("request", request_id = %request_id, method = %method, route = %route);
    let response = next.run(req).instrument(span).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;
    match status {
        500..=599 => tracing::error!(request_id = %request_id, %method, %route, status, duration_ms, "request failed"),
        400..=499 => tracing::warn!(request_id = %request_id, %method, %route, status, duration_ms, "request rejected"),
        // status polling is frequent, keep it out of info logs
        _ if method == axum::http::Method::GET && route == "/api/job/:job_id" => {
            tracing::debug!(request_id = %request_id, %route, status, duration_ms, "request completed")
        }
        _ => tracing::info!(request_id = %request_id, %method, %route, status, duration_ms, "request completed"),
    }

    response
}
