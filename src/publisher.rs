// src/publisher.rs
//! Post-completion publishing of a finished video to external platforms.
//!
//! Publishing never affects a job's status; each platform's outcome is only
//! recorded alongside the job.

use crate::models::{PublishResult, Script};
use async_trait::async_trait;
use std::path::Path;

/// Caption data sent with an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishMetadata {
    pub title: String,
    pub description: String,
}

impl PublishMetadata {
    pub fn for_script(script: &Script) -> Self {
        Self {
            title: script.title.clone(),
            description: script.prompt.clone(),
        }
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, video: &Path, platform: &str, metadata: &PublishMetadata) -> PublishResult;
}

/// Default publisher when no platform integration is configured
pub struct UnconfiguredPublisher;

#[async_trait]
impl Publisher for UnconfiguredPublisher {
    async fn publish(&self, video: &Path, platform: &str, _metadata: &PublishMetadata) -> PublishResult {
        tracing::info!("Publishing to {} skipped for {}", platform, video.display());
        PublishResult {
            status: "skipped".to_string(),
            message: format!("No {} integration configured", platform),
            url: None,
        }
    }
}
