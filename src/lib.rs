// lib.rs - Video generation service: job store, pipeline, service clients and HTTP routes
pub mod audio;
pub mod clients;
pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod publisher;
pub mod renderer;
pub mod store;
pub mod utils;

pub use config::AppConfig;
pub use error::{JobError, StageError};
pub use jobs::{CreateJobRequest, JobManager, SharedJobManager};

/// Shared state handed to every route through `Extension`
pub struct AppState {
    pub config: AppConfig,
    pub job_manager: SharedJobManager,
}
