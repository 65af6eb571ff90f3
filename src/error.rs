// src/error.rs
use crate::models::{JobStatus, StepName};
use thiserror::Error;

/// Errors surfaced by the job store and the job manager
#[derive(Error, Debug)]
pub enum JobError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("job {0} not found")]
    NotFound(String),
    #[error("job {id} has no {kind} artifact")]
    ArtifactNotFound { id: String, kind: String },
    #[error("job {id} cannot be cancelled (status: {status})")]
    NotCancellable { id: String, status: JobStatus },
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("job queue is closed")]
    QueueClosed,
}

/// A pipeline stage that did not complete. Recorded on the job and its
/// step; never returned to whoever created the job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage} failed: {message}")]
pub struct StageError {
    pub stage: StepName,
    pub message: String,
}

impl StageError {
    pub fn new(stage: StepName, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}
