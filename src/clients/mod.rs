// src/clients/mod.rs
//! Clients for the remote generative services (script, image, voice).
//!
//! Every client sits on a [`ServiceClient`], which owns the retry policy and
//! talks to an [`Endpoint`]. Production uses [`HttpEndpoint`]; tests swap in
//! stubs. A client without credentials runs in degraded mode and produces
//! placeholder artifacts instead of calling out.

pub mod image_client;
pub mod retry;
pub mod script_client;
pub mod voice_client;

pub use image_client::ImageClient;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use script_client::ScriptClient;
pub use voice_client::VoiceClient;

use crate::config::ServiceConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single attempt against an endpoint
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("service temporarily unavailable: {0}")]
    Unavailable(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },
    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Rejected { .. })
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{service} failed after {attempts} attempts: {last}")]
    Transport {
        service: &'static str,
        attempts: u32,
        last: TransportError,
    },
    #[error("{service} rejected the request: {source}")]
    Permanent {
        service: &'static str,
        source: TransportError,
    },
    #[error("{service} returned an unusable response: {reason}")]
    InvalidResponse { service: &'static str, reason: String },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ServiceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ServiceError::Io { path: path.into(), source }
    }
}

/// Output of a typed client. `placeholder` is set when the payload was
/// produced locally in degraded mode.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult<T> {
    pub payload: T,
    pub placeholder: bool,
}

impl<T> GenerationResult<T> {
    pub fn generated(payload: T) -> Self {
        Self { payload, placeholder: false }
    }

    pub fn placeholder(payload: T) -> Self {
        Self { payload, placeholder: true }
    }
}

/// One remote inference endpoint: JSON in, raw bytes out
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn post(&self, body: &Value) -> Result<Vec<u8>, TransportError>;
}

/// Bearer-authenticated HTTP endpoint
pub struct HttpEndpoint {
    client: Client,
    url: String,
    token: String,
    timeout: Duration,
}

impl HttpEndpoint {
    pub fn new(url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            token: token.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Endpoint for HttpEndpoint {
    async fn post(&self, body: &Value) -> Result<Vec<u8>, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.timeout)
                } else if e.is_connect() {
                    TransportError::Connect(e.to_string())
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request(format!("Failed to read response: {}", e)))?;

        if (200..300).contains(&status) {
            return Ok(bytes.to_vec());
        }

        let body = String::from_utf8_lossy(&bytes).into_owned();
        Err(classify_status(status, body))
    }
}

/// Map a non-success HTTP status to a retry class
fn classify_status(status: u16, body: String) -> TransportError {
    if status == 503 || body.to_lowercase().contains("loading") {
        TransportError::Unavailable(body)
    } else if status >= 500 || status == 429 || status == 408 {
        TransportError::Server { status, body }
    } else {
        TransportError::Rejected { status, body }
    }
}

/// A named endpoint plus the retry policy applied to every call
#[derive(Clone)]
pub struct ServiceClient {
    name: &'static str,
    endpoint: Arc<dyn Endpoint>,
    policy: RetryPolicy,
}

impl ServiceClient {
    pub fn new(name: &'static str, endpoint: Arc<dyn Endpoint>, policy: RetryPolicy) -> Self {
        Self { name, endpoint, policy }
    }

    /// HTTP-backed client, or `None` when the service has no credentials
    pub fn from_config(name: &'static str, config: &ServiceConfig, policy: &RetryPolicy) -> Option<Self> {
        let token = config.token.as_ref().filter(|_| config.is_configured())?;
        let endpoint = HttpEndpoint::new(config.url.clone(), token.clone(), config.timeout);
        Some(Self::new(name, Arc::new(endpoint), policy.clone()))
    }

    pub async fn call(&self, body: &Value) -> Result<Vec<u8>, ServiceError> {
        retry_with_backoff(self.name, &self.policy, |attempt| {
            tracing::debug!(service = self.name, attempt, "Calling endpoint");
            self.endpoint.post(body)
        })
        .await
    }
}
