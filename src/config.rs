// src/config.rs
//! Runtime configuration, read once from the environment and handed to each
//! component at construction time.

use crate::clients::retry::RetryPolicy;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_SCRIPT_API_URL: &str =
    "https://api-inference.huggingface.co/models/mistralai/Mistral-7B-Instruct-v0.2";
const DEFAULT_IMAGE_API_URL: &str =
    "https://api-inference.huggingface.co/models/stabilityai/stable-diffusion-xl-base-1.0";
const DEFAULT_VOICE_API_URL: &str = "https://api-inference.huggingface.co/models/facebook/mms-tts-eng";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Remote generative endpoint. Without a token the client runs in degraded mode.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl ServiceConfig {
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            token,
            timeout,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && self.token.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RendererConfig {
    /// Renderer executable, either a path or a name looked up on PATH
    pub binary: Option<PathBuf>,
    /// Scene-construction script handed to the renderer with `--python`
    pub scene_script: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub bind_addr: String,
    pub worker_count: usize,
    pub script_service: ServiceConfig,
    pub image_service: ServiceConfig,
    pub voice_service: ServiceConfig,
    pub retry: RetryPolicy,
    pub renderer: RendererConfig,
    pub ffmpeg_binary: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let timeout = Duration::from_secs(60);
        Self {
            data_dir: PathBuf::from("data"),
            uploads_dir: PathBuf::from("uploads"),
            bind_addr: "0.0.0.0:5000".to_string(),
            worker_count: 4,
            script_service: ServiceConfig::new(DEFAULT_SCRIPT_API_URL, None, timeout),
            image_service: ServiceConfig::new(DEFAULT_IMAGE_API_URL, None, timeout),
            voice_service: ServiceConfig::new(DEFAULT_VOICE_API_URL, None, timeout),
            retry: RetryPolicy::default(),
            renderer: RendererConfig::default(),
            ffmpeg_binary: PathBuf::from("ffmpeg"),
        }
    }
}

impl AppConfig {
    /// Build from environment variables. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let timeout = Duration::from_secs(parse_env("SERVICE_TIMEOUT_SECS", 60u64)?);

        let retry = RetryPolicy {
            max_attempts: parse_env("RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
            base_delay: Duration::from_millis(parse_env(
                "RETRY_BASE_DELAY_MS",
                defaults.retry.base_delay.as_millis() as u64,
            )?),
            ..defaults.retry
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RETRY_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        let worker_count = parse_env("WORKER_COUNT", defaults.worker_count)?;
        if worker_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: "WORKER_COUNT",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            data_dir: env_var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            uploads_dir: env_var("UPLOADS_DIR").map(PathBuf::from).unwrap_or(defaults.uploads_dir),
            bind_addr: env_var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            worker_count,
            script_service: service_from_env("SCRIPT", DEFAULT_SCRIPT_API_URL, timeout),
            image_service: service_from_env("IMAGE", DEFAULT_IMAGE_API_URL, timeout),
            voice_service: service_from_env("VOICE", DEFAULT_VOICE_API_URL, timeout),
            retry,
            renderer: RendererConfig {
                binary: env_var("RENDERER_BINARY").map(PathBuf::from),
                scene_script: env_var("RENDERER_SCRIPT").map(PathBuf::from),
            },
            ffmpeg_binary: env_var("FFMPEG_BINARY").map(PathBuf::from).unwrap_or(defaults.ffmpeg_binary),
        })
    }

    /// Persisted job records
    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }

    /// Per-job artifact directories
    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    /// Log which integrations will run for real and which will degrade
    pub fn log_summary(&self) {
        let flag = |configured: bool| if configured { "✅" } else { "❌ (placeholder)" };
        tracing::info!(
            "Configuration - Script: {}, Image: {}, Voice: {}, Renderer: {}, Workers: {}",
            flag(self.script_service.is_configured()),
            flag(self.image_service.is_configured()),
            flag(self.voice_service.is_configured()),
            flag(self.renderer.binary.is_some()),
            self.worker_count
        );
        tracing::info!("Data directory: {}", self.data_dir.display());
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_env<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env_var(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}

fn service_from_env(prefix: &str, default_url: &str, timeout: Duration) -> ServiceConfig {
    ServiceConfig::new(
        env_var(&format!("{}_API_URL", prefix)).unwrap_or_else(|| default_url.to_string()),
        env_var(&format!("{}_API_TOKEN", prefix)),
        timeout,
    )
}
