// End-to-end job scenarios through the manager, worker pool and pipeline
mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use video_generator::clients::TransportError;
use video_generator::config::RendererConfig;
use video_generator::models::{ArtifactKind, JobStatus, StepName, StepStatus};
use video_generator::{CreateJobRequest, JobError};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_all_stages_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let services = stub_services(
        Some(ok_script()),
        Some(ok_images()),
        Some(ok_voice()),
        RendererConfig::default(),
        dir.path(),
    );
    let manager = start_manager(dir.path(), services);

    let job_id = manager
        .create_job(CreateJobRequest::new("a calm lake at sunrise"))
        .await
        .unwrap();
    let job = wait_for_terminal(&manager, &job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.current_step, "Video generation completed");
    assert!(job.error.is_none());
    assert!(job.steps.iter().all(|s| s.status == StepStatus::Completed && s.progress == 100));

    for kind in [ArtifactKind::Script, ArtifactKind::Assets, ArtifactKind::Video] {
        let record = &job.output[&kind];
        assert!(!record.path.as_os_str().is_empty());
        assert!(record.path.exists(), "{:?} artifact missing", kind);
    }
    assert!(!job.output[&ArtifactKind::Script].placeholder);
    assert!(!job.output[&ArtifactKind::Assets].placeholder);
    assert!(!job.output[&ArtifactKind::Audio].placeholder);

    let script: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&job.output[&ArtifactKind::Script].path).unwrap()).unwrap();
    assert_eq!(script["title"], "Calm lake");
    assert_eq!(script["prompt"], "a calm lake at sunrise");

    let image = manager.artifact_path(&job_id, "images", Some(1)).await.unwrap();
    assert_eq!(std::fs::read(image).unwrap(), PNG_BYTES.to_vec());
    assert!(matches!(
        manager.artifact_path(&job_id, "images", Some(9)).await,
        Err(JobError::ArtifactNotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_voice_credentials_complete_with_placeholder_audio() {
    let dir = tempfile::tempdir().unwrap();
    let services = stub_services(
        Some(ok_script()),
        Some(ok_images()),
        None,
        RendererConfig::default(),
        dir.path(),
    );
    let manager = start_manager(dir.path(), services);

    let job_id = manager.create_job(CreateJobRequest::new("a calm lake")).await.unwrap();
    let job = wait_for_terminal(&manager, &job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    let audio = &job.output[&ArtifactKind::Audio];
    assert!(audio.placeholder);
    assert!(audio.path.exists());
    assert!(job.output[&ArtifactKind::Video].placeholder);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_renderer_still_completes() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = RendererConfig {
        binary: Some(dir.path().join("not-installed/blender")),
        scene_script: None,
    };
    let services = stub_services(Some(ok_script()), Some(ok_images()), Some(ok_voice()), renderer, dir.path());
    let manager = start_manager(dir.path(), services);

    let job_id = manager.create_job(CreateJobRequest::new("a calm lake")).await.unwrap();
    let job = wait_for_terminal(&manager, &job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    let animation = &job.output[&ArtifactKind::Animation];
    assert!(animation.placeholder);
    assert!(animation.path.exists());
    assert!(manager.renderer_version().await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_script_service_loading_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let script = FnEndpoint::new(|attempt, _| {
        if attempt <= 2 {
            Err(TransportError::Unavailable("Model is currently loading".into()))
        } else {
            Ok(script_body())
        }
    });
    let services = stub_services(
        Some(script.clone()),
        Some(ok_images()),
        Some(ok_voice()),
        RendererConfig::default(),
        dir.path(),
    );
    let manager = start_manager(dir.path(), services);

    let job_id = manager.create_job(CreateJobRequest::new("a calm lake")).await.unwrap();
    let job = wait_for_terminal(&manager, &job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(script.call_count(), 3);
    assert!(!job.output[&ArtifactKind::Script].placeholder);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_asset_failure_stops_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let images = FnEndpoint::new(|_, _| Err(TransportError::Rejected { status: 403, body: "quota exceeded".into() }));
    let services = stub_services(
        Some(ok_script()),
        Some(images),
        Some(ok_voice()),
        RendererConfig::default(),
        dir.path(),
    );
    let manager = start_manager(dir.path(), services);

    let job_id = manager.create_job(CreateJobRequest::new("a calm lake")).await.unwrap();
    let job = wait_for_terminal(&manager, &job_id).await;

    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.as_deref().unwrap().contains("quota exceeded"));
    assert_eq!(job.progress, 30);
    assert_eq!(job.step(StepName::ScriptGeneration).unwrap().status, StepStatus::Completed);
    assert_eq!(job.step(StepName::AssetGeneration).unwrap().status, StepStatus::Error);
    assert_eq!(job.step(StepName::Animation).unwrap().status, StepStatus::Pending);
    assert_eq!(job.step(StepName::Rendering).unwrap().status, StepStatus::Pending);
    assert!(!job.output.contains_key(&ArtifactKind::Assets));

    // Terminal jobs cannot be cancelled
    assert!(matches!(
        manager.cancel_job(&job_id).await,
        Err(JobError::NotCancellable { status: JobStatus::Error, .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_while_processing_stops_before_next_stage() {
    let dir = tempfile::tempdir().unwrap();
    let script = GatedEndpoint::new(script_body());
    let services = stub_services(
        Some(script.clone()),
        Some(ok_images()),
        Some(ok_voice()),
        RendererConfig::default(),
        dir.path(),
    );
    let manager = start_manager(dir.path(), services);

    let job_id = manager.create_job(CreateJobRequest::new("a calm lake")).await.unwrap();
    script.entered.notified().await;
    let processing = wait_for_status(&manager, &job_id, JobStatus::Processing).await;
    assert_eq!(processing.step(StepName::ScriptGeneration).unwrap().status, StepStatus::Processing);

    let cancelled = manager.cancel_job(&job_id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    // Let the in-flight script call return and give the pipeline time to react
    script.release.notify_one();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let job = manager.get_job(&job_id).await.unwrap();
    assert_eq!(job, cancelled);
    assert_eq!(job.step(StepName::ScriptGeneration).unwrap().status, StepStatus::Processing);
    assert_eq!(job.step(StepName::AssetGeneration).unwrap().status, StepStatus::Pending);
    assert!(job.output.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_stage_is_recorded_as_error() {
    let dir = tempfile::tempdir().unwrap();
    let images = FnEndpoint::new(|_, _| panic!("image decoder exploded"));
    let services = stub_services(
        Some(ok_script()),
        Some(images),
        Some(ok_voice()),
        RendererConfig::default(),
        dir.path(),
    );
    let manager = start_manager(dir.path(), services);

    let job_id = manager.create_job(CreateJobRequest::new("a calm lake")).await.unwrap();
    let job = wait_for_terminal(&manager, &job_id).await;

    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.as_deref().unwrap().contains("image decoder exploded"));
    assert_eq!(job.current_step, "Error during asset_generation");
    assert_eq!(job.step(StepName::ScriptGeneration).unwrap().status, StepStatus::Completed);
    let assets = job.step(StepName::AssetGeneration).unwrap();
    assert_eq!(assets.status, StepStatus::Error);
    assert!(assets.message.contains("image decoder exploded"));
    assert_eq!(job.step(StepName::Animation).unwrap().status, StepStatus::Pending);
    assert_eq!(job.step(StepName::Rendering).unwrap().status, StepStatus::Pending);

    // The worker survives and keeps serving the queue
    let next = manager.create_job(CreateJobRequest::new("Another idea")).await.unwrap();
    assert!(wait_for_terminal(&manager, &next).await.status.is_terminal());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_prompt_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let services = stub_services(None, None, None, RendererConfig::default(), dir.path());
    let manager = start_manager(dir.path(), services);

    let result = manager.create_job(CreateJobRequest::new("")).await;
    assert!(matches!(result, Err(JobError::Validation(_))));
    assert!(manager.list_jobs().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fully_degraded_job_completes_and_lists() {
    let dir = tempfile::tempdir().unwrap();
    let services = stub_services(None, None, None, RendererConfig::default(), dir.path());
    let manager = Arc::new(start_manager(dir.path(), services));

    let first = manager.create_job(CreateJobRequest::new("One. Two. Three.")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = manager.create_job(CreateJobRequest::new("Another idea")).await.unwrap();

    let job = wait_for_terminal(&manager, &first).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.output[&ArtifactKind::Script].placeholder);
    assert!(job.output[&ArtifactKind::Assets].placeholder);
    wait_for_terminal(&manager, &second).await;

    let listed: Vec<String> = manager.list_jobs().await.unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(listed, vec![second, first]);
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_renderer_failure_marks_animation_step() {
    use std::os::unix::fs::PermissionsExt;
    let dir = tempfile::tempdir().unwrap();
    let fake = dir.path().join("fake-blender.sh");
    std::fs::write(&fake, "#!/bin/sh\necho 'Error: scene script crashed' >&2\nexit 1\n").unwrap();
    std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

    let renderer = RendererConfig {
        binary: Some(fake),
        scene_script: None,
    };
    let services = stub_services(Some(ok_script()), Some(ok_images()), Some(ok_voice()), renderer, dir.path());
    let manager = start_manager(dir.path(), services);

    let job_id = manager.create_job(CreateJobRequest::new("a calm lake")).await.unwrap();
    let job = wait_for_terminal(&manager, &job_id).await;

    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.as_deref().unwrap().contains("scene script crashed"));
    assert_eq!(job.step(StepName::Animation).unwrap().status, StepStatus::Error);
    assert_eq!(job.step(StepName::Rendering).unwrap().status, StepStatus::Pending);
    assert!(job.output.contains_key(&ArtifactKind::Assets));
    assert!(!job.output.contains_key(&ArtifactKind::Animation));
}
