// src/models/job.rs
//! Persisted job record, per-stage steps and the partial updates applied to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a generation job
pub type JobId = String;

/// Overall lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    ScriptGeneration,
    AssetGeneration,
    Animation,
    Rendering,
}

impl StepName {
    pub const ALL: [StepName; 4] = [
        StepName::ScriptGeneration,
        StepName::AssetGeneration,
        StepName::Animation,
        StepName::Rendering,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StepName::ScriptGeneration => "script_generation",
            StepName::AssetGeneration => "asset_generation",
            StepName::Animation => "animation",
            StepName::Rendering => "rendering",
        }
    }

    /// Overall progress at the start and end of this stage
    pub fn progress_band(self) -> (u8, u8) {
        match self {
            StepName::ScriptGeneration => (5, 30),
            StepName::AssetGeneration => (30, 60),
            StepName::Animation => (60, 90),
            StepName::Rendering => (90, 100),
        }
    }

    fn waiting_message(self) -> &'static str {
        match self {
            StepName::ScriptGeneration => "Waiting to start",
            StepName::AssetGeneration => "Waiting for script generation",
            StepName::Animation => "Waiting for asset generation",
            StepName::Rendering => "Waiting for animation",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl StepStatus {
    /// Completed and error are final for a step
    pub fn is_settled(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Error)
    }

    fn rank(self) -> u8 {
        match self {
            StepStatus::Pending => 0,
            StepStatus::Processing => 1,
            StepStatus::Completed | StepStatus::Error => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: StepName,
    pub status: StepStatus,
    pub progress: u8,
    pub message: String,
}

impl Step {
    fn waiting(name: StepName) -> Self {
        Self {
            name,
            status: StepStatus::Pending,
            progress: 0,
            message: name.waiting_message().to_string(),
        }
    }
}

/// Kinds of files a job can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Script,
    Assets,
    Animation,
    Audio,
    Video,
}

impl ArtifactKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "script" => Some(ArtifactKind::Script),
            "assets" => Some(ArtifactKind::Assets),
            "animation" => Some(ArtifactKind::Animation),
            "audio" => Some(ArtifactKind::Audio),
            "video" => Some(ArtifactKind::Video),
            _ => None,
        }
    }
}

/// A produced file. `placeholder` marks a degraded-mode substitute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    #[serde(default)]
    pub placeholder: bool,
}

impl ArtifactRecord {
    pub fn generated(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), placeholder: false }
    }

    pub fn placeholder(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), placeholder: true }
    }

    pub fn new(path: impl Into<PathBuf>, placeholder: bool) -> Self {
        Self { path: path.into(), placeholder }
    }
}

/// Outcome of publishing a finished video to one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub prompt: String,
    #[serde(default)]
    pub image_ref: Option<String>,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output: BTreeMap<ArtifactKind, ArtifactRecord>,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub publish_results: BTreeMap<String, PublishResult>,
}

impl Job {
    pub fn new(prompt: String, image_ref: Option<String>, platforms: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            prompt,
            image_ref,
            status: JobStatus::Pending,
            progress: 0,
            current_step: "Job created, waiting to start".to_string(),
            steps: StepName::ALL.iter().map(|name| Step::waiting(*name)).collect(),
            created_at: now,
            updated_at: now,
            error: None,
            output: BTreeMap::new(),
            platforms,
            publish_results: BTreeMap::new(),
        }
    }

    pub fn step(&self, name: StepName) -> Option<&Step> {
        self.steps.iter().find(|step| step.name == name)
    }

    /// The step currently marked processing, if any
    pub fn active_step(&self) -> Option<StepName> {
        self.steps
            .iter()
            .find(|step| step.status == StepStatus::Processing)
            .map(|step| step.name)
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            prompt: self.prompt.clone(),
            status: self.status,
            progress: self.progress,
            current_step: self.current_step.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Apply a partial update, keeping the lifecycle invariants:
    /// a terminal job only accepts publish results, progress never goes
    /// backwards, and a settled step never changes again.
    ///
    /// Returns the parts of the update that were rejected, for logging.
    pub fn apply(&mut self, update: JobUpdate) -> Vec<String> {
        let mut rejected = Vec::new();

        self.publish_results.extend(update.publish_results);

        if self.status.is_terminal() {
            if update.status.is_some() || update.step.is_some() || update.progress.is_some() {
                rejected.push(format!("job is already {}", self.status));
            }
            return rejected;
        }

        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = self.progress.max(progress.min(100));
        }
        if let Some(current_step) = update.current_step {
            self.current_step = current_step;
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        for (kind, record) in update.output {
            self.output.insert(kind, record);
        }

        if let Some(step_update) = update.step {
            match self.steps.iter_mut().find(|step| step.name == step_update.name) {
                Some(step) if step.status.is_settled() => {
                    rejected.push(format!("step {} is already {:?}", step.name, step.status));
                }
                Some(step) => {
                    if let Some(status) = step_update.status {
                        if status.rank() >= step.status.rank() {
                            step.status = status;
                        } else {
                            rejected.push(format!(
                                "step {} cannot go from {:?} to {:?}",
                                step.name, step.status, status
                            ));
                        }
                    }
                    if let Some(progress) = step_update.progress {
                        step.progress = step.progress.max(progress.min(100));
                    }
                    if let Some(message) = step_update.message {
                        step.message = message;
                    }
                }
                None => rejected.push(format!("unknown step {}", step_update.name)),
            }
        }

        rejected
    }
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub prompt: String,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepUpdate {
    pub name: StepName,
    pub status: Option<StepStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
}

impl StepUpdate {
    pub fn new(name: StepName) -> Self {
        Self { name, status: None, progress: None, message: None }
    }

    pub fn status(mut self, status: StepStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Partial job fields for a read-modify-write in the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub current_step: Option<String>,
    pub error: Option<String>,
    pub step: Option<StepUpdate>,
    pub output: Vec<(ArtifactKind, ArtifactRecord)>,
    pub publish_results: BTreeMap<String, PublishResult>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn current_step(mut self, current_step: impl Into<String>) -> Self {
        self.current_step = Some(current_step.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn step(mut self, step: StepUpdate) -> Self {
        self.step = Some(step);
        self
    }

    pub fn output(mut self, kind: ArtifactKind, record: ArtifactRecord) -> Self {
        self.output.push((kind, record));
        self
    }

    pub fn publish_result(mut self, platform: impl Into<String>, result: PublishResult) -> Self {
        self.publish_results.insert(platform.into(), result);
        self
    }
}
