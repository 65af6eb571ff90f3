// src/jobs/video_job.rs
//! Video generation pipeline - runs one job through its four stages
//! (script → assets → animation → rendering) and records every transition.

use crate::audio::AudioMuxer;
use crate::clients::{ImageClient, ScriptClient, ServiceClient, VoiceClient};
use crate::config::AppConfig;
use crate::error::{JobError, StageError};
use crate::models::{
    ArtifactKind, ArtifactRecord, AssetBundle, Job, JobStatus, JobUpdate, Script, StepName, StepStatus, StepUpdate,
};
use crate::publisher::{PublishMetadata, Publisher, UnconfiguredPublisher};
use crate::renderer::RendererInvoker;
use crate::store::JobStore;
use crate::utils::{write_json_pretty, UPLOAD_EXTENSIONS};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The external collaborators a pipeline calls
pub struct PipelineServices {
    pub script: ScriptClient,
    pub images: ImageClient,
    pub voice: VoiceClient,
    pub renderer: RendererInvoker,
    pub muxer: AudioMuxer,
    pub publisher: Arc<dyn Publisher>,
}

impl PipelineServices {
    pub fn from_config(config: &AppConfig) -> Self {
        let retry = &config.retry;
        Self {
            script: ScriptClient::new(ServiceClient::from_config("script", &config.script_service, retry)),
            images: ImageClient::new(ServiceClient::from_config("image", &config.image_service, retry)),
            voice: VoiceClient::new(ServiceClient::from_config("voice", &config.voice_service, retry)),
            renderer: RendererInvoker::new(&config.renderer),
            muxer: AudioMuxer::new(&config.ffmpeg_binary),
            publisher: Arc::new(UnconfiguredPublisher),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed,
    Failed(StageError),
    /// The job became terminal from outside (cancelled) and the pipeline
    /// stopped before its next stage
    Cancelled,
}

pub struct Pipeline {
    store: Arc<JobStore>,
    services: PipelineServices,
    output_root: PathBuf,
    uploads_dir: PathBuf,
}

impl Pipeline {
    pub fn new(store: Arc<JobStore>, services: PipelineServices, output_root: PathBuf, uploads_dir: PathBuf) -> Self {
        Self {
            store,
            services,
            output_root,
            uploads_dir,
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn services(&self) -> &PipelineServices {
        &self.services
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.output_root.join(job_id)
    }

    /// Run every stage for one job. Stage failures are recorded on the job
    /// and reported as [`PipelineOutcome::Failed`]; `Err` means the job
    /// store itself failed.
    pub async fn run(&self, job_id: &str) -> Result<PipelineOutcome, JobError> {
        let job = self.store.get_job(job_id).await?;
        if job.status.is_terminal() {
            tracing::info!(job_id, "Job is already {}, not starting", job.status);
            return Ok(PipelineOutcome::Cancelled);
        }

        tracing::info!(job_id, "🎬 Starting video generation");
        self.store
            .update_status(
                job_id,
                JobUpdate::new()
                    .status(JobStatus::Processing)
                    .progress(5)
                    .current_step("Initializing"),
            )
            .await?;
        let job_dir = self.job_dir(job_id);

        // Script
        if !self.begin_stage(job_id, StepName::ScriptGeneration, "Generating script").await? {
            return Ok(PipelineOutcome::Cancelled);
        }
        let (script, script_record) = match self.generate_script(&job, &job_dir).await {
            Ok(done) => done,
            Err(e) => return self.fail(job_id, e).await,
        };
        self.complete_stage(
            job_id,
            StepName::ScriptGeneration,
            "Script generated",
            vec![(ArtifactKind::Script, script_record)],
        )
        .await?;

        // Assets
        if !self.begin_stage(job_id, StepName::AssetGeneration, "Generating assets").await? {
            return Ok(PipelineOutcome::Cancelled);
        }
        let (assets, assets_record) = match self.generate_assets(&job, &script, &job_dir).await {
            Ok(done) => done,
            Err(e) => return self.fail(job_id, e).await,
        };
        self.complete_stage(
            job_id,
            StepName::AssetGeneration,
            "Assets generated",
            vec![(ArtifactKind::Assets, assets_record)],
        )
        .await?;

        // Animation
        if !self.begin_stage(job_id, StepName::Animation, "Creating animation").await? {
            return Ok(PipelineOutcome::Cancelled);
        }
        let animation = match self.animate(&script, &assets, &job_dir).await {
            Ok(record) => record,
            Err(e) => return self.fail(job_id, e).await,
        };
        self.complete_stage(
            job_id,
            StepName::Animation,
            "Animation created",
            vec![(ArtifactKind::Animation, animation.clone())],
        )
        .await?;

        // Rendering
        if !self.begin_stage(job_id, StepName::Rendering, "Rendering final video").await? {
            return Ok(PipelineOutcome::Cancelled);
        }
        let (audio, video) = match self.render_video(&script, &animation, &job_dir).await {
            Ok(done) => done,
            Err(e) => return self.fail(job_id, e).await,
        };
        let video_path = video.path.clone();
        self.complete_stage(
            job_id,
            StepName::Rendering,
            "Video rendered",
            vec![(ArtifactKind::Audio, audio), (ArtifactKind::Video, video)],
        )
        .await?;

        let finished = self
            .store
            .update_status(
                job_id,
                JobUpdate::new()
                    .status(JobStatus::Completed)
                    .progress(100)
                    .current_step("Video generation completed"),
            )
            .await?;
        if finished.status != JobStatus::Completed {
            return Ok(PipelineOutcome::Cancelled);
        }
        tracing::info!(job_id, "✅ Video generation completed: {}", video_path.display());

        self.publish(&finished, &script, &video_path).await;
        Ok(PipelineOutcome::Completed)
    }

    /// Mark a stage as started. Returns `false` when the job has become
    /// terminal and the stage must not run.
    async fn begin_stage(&self, job_id: &str, stage: StepName, message: &str) -> Result<bool, JobError> {
        let job = self.store.get_job(job_id).await?;
        if job.status.is_terminal() {
            tracing::info!(job_id, stage = %stage, "Job is {}, stopping", job.status);
            return Ok(false);
        }

        tracing::info!(job_id, stage = %stage, "▶️ {}", message);
        let (start, _) = stage.progress_band();
        let updated = self
            .store
            .update_status(
                job_id,
                JobUpdate::new()
                    .status(JobStatus::Processing)
                    .progress(start)
                    .current_step(message)
                    .step(StepUpdate::new(stage).status(StepStatus::Processing).message(message)),
            )
            .await?;
        Ok(!updated.status.is_terminal())
    }

    async fn complete_stage(
        &self,
        job_id: &str,
        stage: StepName,
        message: &str,
        outputs: Vec<(ArtifactKind, ArtifactRecord)>,
    ) -> Result<(), JobError> {
        let (_, end) = stage.progress_band();
        let mut update = JobUpdate::new()
            .progress(end)
            .current_step(message)
            .step(StepUpdate::new(stage).status(StepStatus::Completed).progress(100).message(message));
        for (kind, record) in outputs {
            update = update.output(kind, record);
        }
        self.store.update_status(job_id, update).await?;
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: StageError) -> Result<PipelineOutcome, JobError> {
        self.record_failure(job_id, &error).await?;
        Ok(PipelineOutcome::Failed(error))
    }

    /// Put the job and the failed stage's step into the error state
    pub async fn record_failure(&self, job_id: &str, error: &StageError) -> Result<(), JobError> {
        tracing::error!(job_id, stage = %error.stage, "❌ {}", error.message);
        self.store
            .update_status(
                job_id,
                JobUpdate::new()
                    .status(JobStatus::Error)
                    .error(error.message.clone())
                    .current_step(format!("Error during {}", error.stage))
                    .step(
                        StepUpdate::new(error.stage)
                            .status(StepStatus::Error)
                            .message(error.message.clone()),
                    ),
            )
            .await?;
        Ok(())
    }

    async fn generate_script(&self, job: &Job, job_dir: &Path) -> Result<(Script, ArtifactRecord), StageError> {
        let stage = StepName::ScriptGeneration;
        tokio::fs::create_dir_all(job_dir)
            .await
            .map_err(|e| StageError::new(stage, format!("Failed to create job directory: {}", e)))?;

        let generated = self
            .services
            .script
            .generate(&job.prompt)
            .await
            .map_err(|e| StageError::new(stage, e.to_string()))?;

        let path = job_dir.join("script.json");
        write_json_pretty(&path, &generated.payload)
            .await
            .map_err(|e| StageError::new(stage, format!("Failed to write script: {}", e)))?;
        tracing::info!(
            job_id = %job.id,
            "📝 Script '{}' with {} scenes",
            generated.payload.title,
            generated.payload.scenes.len()
        );
        Ok((generated.payload, ArtifactRecord::new(path, generated.placeholder)))
    }

    async fn generate_assets(
        &self,
        job: &Job,
        script: &Script,
        job_dir: &Path,
    ) -> Result<(AssetBundle, ArtifactRecord), StageError> {
        let stage = StepName::AssetGeneration;
        let mut assets = self
            .services
            .images
            .generate_for_scenes(script, &job_dir.join("images"))
            .await
            .map_err(|e| StageError::new(stage, e.to_string()))?;
        assets.reference_image = job
            .image_ref
            .as_deref()
            .and_then(|image_ref| self.resolve_upload(image_ref));

        let path = job_dir.join("assets.json");
        write_json_pretty(&path, &assets)
            .await
            .map_err(|e| StageError::new(stage, format!("Failed to write asset manifest: {}", e)))?;
        let placeholder = assets.placeholder;
        Ok((assets, ArtifactRecord::new(path, placeholder)))
    }

    async fn animate(&self, script: &Script, assets: &AssetBundle, job_dir: &Path) -> Result<ArtifactRecord, StageError> {
        let outcome = self
            .services
            .renderer
            .render(job_dir, script, assets)
            .await
            .map_err(|e| StageError::new(StepName::Animation, e.to_string()))?;
        Ok(ArtifactRecord::new(outcome.output_path, outcome.placeholder))
    }

    async fn render_video(
        &self,
        script: &Script,
        animation: &ArtifactRecord,
        job_dir: &Path,
    ) -> Result<(ArtifactRecord, ArtifactRecord), StageError> {
        let stage = StepName::Rendering;
        let narration = self
            .services
            .voice
            .synthesize(script, &job_dir.join("audio"))
            .await
            .map_err(|e| StageError::new(stage, e.to_string()))?;
        let audio = ArtifactRecord::new(narration.payload, narration.placeholder);

        let muxed = self
            .services
            .muxer
            .mux(animation, &audio, &job_dir.join("video.mp4"))
            .await
            .map_err(|e| StageError::new(stage, e.to_string()))?;
        Ok((audio, ArtifactRecord::new(muxed.path, muxed.placeholder)))
    }

    /// Map an uploaded image id (with or without extension) to its file
    pub fn resolve_upload(&self, image_ref: &str) -> Option<PathBuf> {
        let valid = !image_ref.is_empty()
            && !image_ref.starts_with('.')
            && image_ref.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        if !valid {
            tracing::warn!("Ignoring invalid image reference {:?}", image_ref);
            return None;
        }

        let direct = self.uploads_dir.join(image_ref);
        let found = if direct.extension().is_some() && direct.is_file() {
            Some(direct)
        } else {
            UPLOAD_EXTENSIONS
                .iter()
                .map(|ext| self.uploads_dir.join(format!("{}.{}", image_ref, ext)))
                .find(|candidate| candidate.is_file())
        };
        if found.is_none() {
            tracing::warn!("Reference image {} not found in uploads", image_ref);
        }
        found
    }

    async fn publish(&self, job: &Job, script: &Script, video: &Path) {
        if job.platforms.is_empty() {
            return;
        }
        let metadata = PublishMetadata::for_script(script);
        let publisher = &self.services.publisher;
        let results = join_all(job.platforms.iter().map(|platform| {
            let metadata = &metadata;
            async move { (platform.clone(), publisher.publish(video, platform, metadata).await) }
        }))
        .await;

        let mut update = JobUpdate::new();
        for (platform, result) in results {
            tracing::info!(job_id = %job.id, "📤 Publish to {}: {}", platform, result.status);
            update = update.publish_result(platform, result);
        }
        if let Err(e) = self.store.update_status(&job.id, update).await {
            tracing::warn!(job_id = %job.id, "Failed to record publish results: {}", e);
        }
    }
}
