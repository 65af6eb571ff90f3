// src/jobs/mod.rs
//! Background job system for video generation.
//! `JobManager` is the entry point: it validates requests, persists jobs and
//! hands them to the worker pool, which runs each through the pipeline.

use crate::config::AppConfig;
use crate::error::{JobError, StageError};
use crate::models::{ArtifactKind, AssetBundle, Job, JobId, JobSummary, StepName};
use crate::renderer::RenderError;
use crate::store::{FileKvStore, JobStore};
use crate::utils::supported_image_extension;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

pub mod video_job;
pub mod worker;

pub use video_job::{Pipeline, PipelineOutcome, PipelineServices};
pub use worker::WorkerPool;

/// Longest prompt accepted, in characters
pub const MAX_PROMPT_CHARS: usize = 2000;

/// Body of a create-job request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateJobRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default, alias = "image_id")]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
}

impl CreateJobRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// A stored reference image
#[derive(Debug, Clone, Serialize)]
pub struct UploadedImage {
    pub image_id: String,
    pub filename: String,
}

pub struct JobManager {
    store: Arc<JobStore>,
    pipeline: Arc<Pipeline>,
    workers: WorkerPool,
    uploads_dir: PathBuf,
}

/// Shared handle for route handlers
pub type SharedJobManager = Arc<JobManager>;

impl JobManager {
    /// File-backed manager with HTTP service clients, as the server runs it
    pub async fn from_config(config: &AppConfig) -> Result<Self, JobError> {
        let kv = FileKvStore::open(config.jobs_dir()).await?;
        let store = Arc::new(JobStore::new(Arc::new(kv)));
        Ok(Self::start(config, store, PipelineServices::from_config(config)))
    }

    /// Wire a manager from explicit parts and start its workers.
    /// Must be called inside a tokio runtime.
    pub fn start(config: &AppConfig, store: Arc<JobStore>, services: PipelineServices) -> Self {
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            services,
            config.output_dir(),
            config.uploads_dir.clone(),
        ));
        let workers = WorkerPool::start(config.worker_count, pipeline.clone());
        Self {
            store,
            pipeline,
            workers,
            uploads_dir: config.uploads_dir.clone(),
        }
    }

    /// Validate, persist and enqueue a job. Returns as soon as the job is queued.
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<JobId, JobError> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(JobError::Validation("No prompt provided".to_string()));
        }
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(JobError::Validation(format!(
                "Prompt is longer than {} characters",
                MAX_PROMPT_CHARS
            )));
        }

        let image_ref = request
            .image_ref
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let mut platforms: Vec<String> = Vec::new();
        for platform in request.platforms {
            let platform = platform.trim().to_lowercase();
            if !platform.is_empty() && !platforms.contains(&platform) {
                platforms.push(platform);
            }
        }

        let job = self.store.create_job(prompt.to_string(), image_ref, platforms).await?;
        if let Err(e) = self.workers.submit(job.id.clone()).await {
            // Nothing will ever pick the job up, so it must not stay pending
            let failure = StageError::new(StepName::ScriptGeneration, format!("Job was not queued: {}", e));
            if let Err(record_err) = self.pipeline.record_failure(&job.id, &failure).await {
                tracing::error!(job_id = %job.id, "Failed to record queueing failure: {}", record_err);
            }
            return Err(e);
        }
        Ok(job.id)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job, JobError> {
        self.store.get_job(job_id).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>, JobError> {
        self.store.list_jobs().await
    }

    pub async fn list_jobs_page(&self, limit: usize, offset: usize) -> Result<Vec<JobSummary>, JobError> {
        self.store.list_jobs_page(limit, offset).await
    }

    /// Advisory cancel: a stage already in flight runs to its end, but the
    /// pipeline will not start another one.
    pub async fn cancel_job(&self, job_id: &str) -> Result<Job, JobError> {
        self.store.cancel_if_active(job_id).await
    }

    pub async fn renderer_version(&self) -> Result<String, RenderError> {
        self.pipeline.services().renderer.get_version().await
    }

    /// File behind an artifact of a job. `images` addresses a single scene
    /// image through the asset manifest.
    pub async fn artifact_path(&self, job_id: &str, kind: &str, index: Option<usize>) -> Result<PathBuf, JobError> {
        let job = self.store.get_job(job_id).await?;
        let missing = || JobError::ArtifactNotFound {
            id: job_id.to_string(),
            kind: kind.to_string(),
        };

        if kind == "images" {
            let manifest = job.output.get(&ArtifactKind::Assets).ok_or_else(missing)?;
            let bytes = tokio::fs::read(&manifest.path).await?;
            let assets: AssetBundle = serde_json::from_slice(&bytes)?;
            return assets.images.get(index.unwrap_or(0)).cloned().ok_or_else(missing);
        }

        let kind_key = ArtifactKind::parse(kind).ok_or_else(missing)?;
        job.output
            .get(&kind_key)
            .map(|record| record.path.clone())
            .ok_or_else(missing)
    }

    /// Store an uploaded reference image under a fresh id
    pub async fn save_upload(&self, filename: &str, bytes: &[u8]) -> Result<UploadedImage, JobError> {
        if bytes.is_empty() {
            return Err(JobError::Validation("No file selected".to_string()));
        }
        let ext = supported_image_extension(filename)
            .ok_or_else(|| JobError::Validation("File type not allowed".to_string()))?;

        let image_id = Uuid::new_v4().to_string();
        let filename = format!("{}.{}", image_id, ext);
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        tokio::fs::write(self.uploads_dir.join(&filename), bytes).await?;
        tracing::info!("📁 Stored upload {}", filename);

        Ok(UploadedImage { image_id, filename })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.worker_count()
    }

    /// Stop accepting jobs; queued ones still run
    pub async fn stop(&self) {
        self.workers.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKvStore;
    use std::path::Path;

    fn manager(root: &Path) -> JobManager {
        let config = AppConfig {
            data_dir: root.join("data"),
            uploads_dir: root.join("uploads"),
            ffmpeg_binary: PathBuf::from("/nonexistent/ffmpeg"),
            ..AppConfig::default()
        };
        let store = Arc::new(JobStore::new(Arc::new(MemoryKvStore::new())));
        JobManager::start(&config, store, PipelineServices::from_config(&config))
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected_and_nothing_stored() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let result = manager.create_job(CreateJobRequest::new("   ")).await;
        assert!(matches!(result, Err(JobError::Validation(_))));
        assert!(manager.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overlong_prompt_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let prompt = "a".repeat(MAX_PROMPT_CHARS + 1);
        assert!(matches!(
            manager.create_job(CreateJobRequest::new(prompt)).await,
            Err(JobError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_create_request_accepts_image_id_alias() {
        let request: CreateJobRequest =
            serde_json::from_str(r#"{"prompt": "a lake", "image_id": "abc", "platforms": ["YouTube", "youtube"]}"#)
                .unwrap();
        assert_eq!(request.image_ref.as_deref(), Some("abc"));

        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let id = manager.create_job(request).await.unwrap();
        let job = manager.get_job(&id).await.unwrap();
        assert_eq!(job.platforms, vec!["youtube".to_string()]);
    }

    #[tokio::test]
    async fn test_upload_checks_extension() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let uploaded = manager.save_upload("Photo.JPG", b"jpeg-bytes").await.unwrap();
        assert!(uploaded.filename.ends_with(".jpg"));
        assert!(dir.path().join("uploads").join(&uploaded.filename).exists());

        assert!(matches!(
            manager.save_upload("evil.sh", b"#!/bin/sh").await,
            Err(JobError::Validation(_))
        ));
        assert!(matches!(manager.save_upload("a.png", b"").await, Err(JobError::Validation(_))));
    }

    #[tokio::test]
    async fn test_missing_prompt_field_reaches_validation() {
        let request: CreateJobRequest = serde_json::from_str(r#"{"platforms": []}"#).unwrap();
        assert!(request.prompt.is_empty());

        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        assert!(matches!(manager.create_job(request).await, Err(JobError::Validation(_))));
    }

    #[tokio::test]
    async fn test_job_is_failed_when_queue_is_closed() {
        use crate::models::{JobStatus, StepStatus};

        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.stop().await;

        let result = manager.create_job(CreateJobRequest::new("a calm lake")).await;
        assert!(matches!(result, Err(JobError::QueueClosed)));

        let jobs = manager.list_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        let job = manager.get_job(&jobs[0].id).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error.as_deref().unwrap().contains("not queued"));
        assert_eq!(job.step(StepName::ScriptGeneration).unwrap().status, StepStatus::Error);
    }

    #[tokio::test]
    async fn test_unknown_job_cancel_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let missing = Uuid::new_v4().to_string();
        assert!(matches!(manager.cancel_job(&missing).await, Err(JobError::NotFound(_))));
        assert!(matches!(
            manager.artifact_path(&missing, "video", None).await,
            Err(JobError::NotFound(_))
        ));
    }
}
