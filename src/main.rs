use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use video_generator::{handlers, middleware, AppConfig, AppState, JobManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging()?;

    let config = AppConfig::from_env()?;
    config.log_summary();

    for dir in [&config.data_dir, &config.uploads_dir] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!("Failed to create {}: {}", dir.display(), e);
        }
    }

    let job_manager = Arc::new(JobManager::from_config(&config).await?);
    tracing::info!("🎬 Job manager ready with {} workers", job_manager.worker_count());

    let bind_addr = config.bind_addr.clone();
    let shared_state = Arc::new(AppState {
        config,
        job_manager: job_manager.clone(),
    });

    let app = Router::new()
        .merge(handlers::api_routes())
        .route("/api/status", axum::routing::get(api_status))
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(shared_state));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    job_manager.stop().await;
    tracing::info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn api_status(Extension(state): Extension<Arc<AppState>>) -> axum::response::Json<serde_json::Value> {
    axum::response::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "workers": state.job_manager.worker_count(),
        "integrations": {
            "script": state.config.script_service.is_configured(),
            "image": state.config.image_service.is_configured(),
            "voice": state.config.voice_service.is_configured(),
            "renderer": state.config.renderer.binary.is_some(),
        }
    }))
}

// Logging: RUST_LOG filter, LOG_FORMAT=json for aggregation
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "info,video_generator=debug,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).try_init()?;

    tracing::info!("🎬 Video generator starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);
    Ok(())
}
