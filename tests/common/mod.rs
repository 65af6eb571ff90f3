// Shared fixtures for the pipeline scenario tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use video_generator::audio::AudioMuxer;
use video_generator::clients::{
    Endpoint, ImageClient, RetryPolicy, ScriptClient, ServiceClient, TransportError, VoiceClient,
};
use video_generator::config::RendererConfig;
use video_generator::jobs::PipelineServices;
use video_generator::models::{Job, JobStatus};
use video_generator::publisher::UnconfiguredPublisher;
use video_generator::renderer::RendererInvoker;
use video_generator::store::{JobStore, MemoryKvStore};
use video_generator::{AppConfig, JobManager};

pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
pub const WAV_BYTES: &[u8] = b"RIFF\x24\0\0\0WAVEfmt ";

/// Endpoint answering every call with a closure, counting attempts
pub struct FnEndpoint<F> {
    respond: F,
    pub calls: AtomicU32,
}

impl<F> FnEndpoint<F>
where
    F: Fn(u32, &Value) -> Result<Vec<u8>, TransportError> + Send + Sync,
{
    pub fn new(respond: F) -> Arc<Self> {
        Arc::new(Self {
            respond,
            calls: AtomicU32::new(0),
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> Endpoint for FnEndpoint<F>
where
    F: Fn(u32, &Value) -> Result<Vec<u8>, TransportError> + Send + Sync,
{
    async fn post(&self, body: &Value) -> Result<Vec<u8>, TransportError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        (self.respond)(attempt, body)
    }
}

/// Endpoint that blocks each call until released, announcing when it is entered
pub struct GatedEndpoint {
    pub entered: Notify,
    pub release: Notify,
    response: Vec<u8>,
}

impl GatedEndpoint {
    pub fn new(response: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Notify::new(),
            response,
        })
    }
}

#[async_trait]
impl Endpoint for GatedEndpoint {
    async fn post(&self, _body: &Value) -> Result<Vec<u8>, TransportError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(self.response.clone())
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
    }
}

pub fn service(name: &'static str, endpoint: Arc<dyn Endpoint>) -> Option<ServiceClient> {
    Some(ServiceClient::new(name, endpoint, fast_retry()))
}

pub fn script_body() -> Vec<u8> {
    let text = r#"{"title": "Calm lake", "scenes": [
        {"description": "Mist rising over still water", "duration": 3, "narration": "The lake wakes."},
        {"description": "Sun breaking over the ridge", "duration": 2, "camera": "pan", "narration": "Light arrives."}
    ]}"#;
    serde_json::to_vec(&json!([{ "generated_text": text }])).unwrap()
}

pub fn ok_script() -> Arc<dyn Endpoint> {
    FnEndpoint::new(|_, _| Ok(script_body()))
}

pub fn ok_images() -> Arc<dyn Endpoint> {
    FnEndpoint::new(|_, _| Ok(PNG_BYTES.to_vec()))
}

pub fn ok_voice() -> Arc<dyn Endpoint> {
    FnEndpoint::new(|_, _| Ok(WAV_BYTES.to_vec()))
}

pub fn test_config(root: &Path) -> AppConfig {
    AppConfig {
        data_dir: root.join("data"),
        uploads_dir: root.join("uploads"),
        worker_count: 2,
        retry: fast_retry(),
        ffmpeg_binary: root.join("no-ffmpeg"),
        ..AppConfig::default()
    }
}

/// All clients stubbed; renderer unconfigured so it writes a placeholder
pub fn stub_services(
    script: Option<Arc<dyn Endpoint>>,
    images: Option<Arc<dyn Endpoint>>,
    voice: Option<Arc<dyn Endpoint>>,
    renderer: RendererConfig,
    root: &Path,
) -> PipelineServices {
    PipelineServices {
        script: ScriptClient::new(script.and_then(|e| service("script", e))),
        images: ImageClient::new(images.and_then(|e| service("image", e))),
        voice: VoiceClient::new(voice.and_then(|e| service("voice", e))),
        renderer: RendererInvoker::new(&renderer),
        muxer: AudioMuxer::new(&root.join("no-ffmpeg")),
        publisher: Arc::new(UnconfiguredPublisher),
    }
}

pub fn start_manager(root: &Path, services: PipelineServices) -> JobManager {
    let store = Arc::new(JobStore::new(Arc::new(MemoryKvStore::new())));
    JobManager::start(&test_config(root), store, services)
}

/// Poll until the job reaches a terminal status
pub async fn wait_for_terminal(manager: &JobManager, job_id: &str) -> Job {
    for _ in 0..500 {
        let job = manager.get_job(job_id).await.unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish", job_id);
}

pub async fn wait_for_status(manager: &JobManager, job_id: &str, status: JobStatus) -> Job {
    for _ in 0..500 {
        let job = manager.get_job(job_id).await.unwrap();
        if job.status == status {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached {}", job_id, status);
}
