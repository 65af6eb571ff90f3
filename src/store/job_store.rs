// src/store/job_store.rs
//! Job persistence with per-job serialized read-modify-write.

use super::KvStore;
use crate::error::JobError;
use crate::models::{ArtifactKind, ArtifactRecord, Job, JobId, JobStatus, JobSummary, JobUpdate};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

pub struct JobStore {
    kv: Arc<dyn KvStore>,
    /// One mutex per job id. The registry lock is only held to look up or
    /// insert an entry, never across I/O.
    locks: RwLock<HashMap<JobId, Arc<Mutex<()>>>>,
}

impl JobStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            locks: RwLock::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, job_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(job_id) {
            return lock.clone();
        }
        self.locks
            .write()
            .await
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the registry entry once no other task holds or waits on it
    async fn release_lock(&self, job_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.write().await;
        // one reference in the map, one here
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(job_id);
        }
    }

    #[cfg(test)]
    async fn lock_count(&self) -> usize {
        self.locks.read().await.len()
    }

    async fn save(&self, job: &Job) -> Result<(), JobError> {
        let bytes = serde_json::to_vec_pretty(job)?;
        self.kv.put(&job.id, &bytes).await
    }

    async fn load(&self, job_id: &str) -> Result<Job, JobError> {
        // Ids are UUIDs; anything else cannot name a stored record
        if Uuid::parse_str(job_id).is_err() {
            return Err(JobError::NotFound(job_id.to_string()));
        }
        let bytes = self
            .kv
            .get(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn create_job(
        &self,
        prompt: String,
        image_ref: Option<String>,
        platforms: Vec<String>,
    ) -> Result<Job, JobError> {
        let job = Job::new(prompt, image_ref, platforms);
        self.save(&job).await?;
        tracing::info!(job_id = %job.id, "🎬 Created job with prompt: {}", job.prompt);
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job, JobError> {
        self.load(job_id).await
    }

    /// All readable jobs, newest first. Corrupt records are logged and skipped.
    pub async fn list_jobs(&self) -> Result<Vec<JobSummary>, JobError> {
        let mut summaries = Vec::new();
        for key in self.kv.keys().await? {
            let Some(bytes) = self.kv.get(&key).await? else {
                continue;
            };
            match serde_json::from_slice::<Job>(&bytes) {
                Ok(job) => summaries.push(job.summary()),
                Err(e) => tracing::warn!(key = %key, "Skipping corrupt job record: {}", e),
            }
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    pub async fn list_jobs_page(&self, limit: usize, offset: usize) -> Result<Vec<JobSummary>, JobError> {
        Ok(self.list_jobs().await?.into_iter().skip(offset).take(limit).collect())
    }

    /// Atomic read-modify-write of one job
    pub async fn update_status(&self, job_id: &str, update: JobUpdate) -> Result<Job, JobError> {
        // Unknown ids fail here without registering a lock
        self.load(job_id).await?;
        let lock = self.lock_for(job_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.apply_locked(job_id, update).await
        };
        self.release_lock(job_id, lock).await;
        result
    }

    async fn apply_locked(&self, job_id: &str, update: JobUpdate) -> Result<Job, JobError> {
        let mut job = self.load(job_id).await?;
        let before = job.clone();
        let rejected = job.apply(update);
        for reason in &rejected {
            tracing::debug!(job_id, "Ignored part of job update: {}", reason);
        }
        if job == before {
            return Ok(job);
        }
        job.updated_at = Utc::now();
        self.save(&job).await?;
        Ok(job)
    }

    pub async fn update_output(
        &self,
        job_id: &str,
        kind: ArtifactKind,
        record: ArtifactRecord,
    ) -> Result<Job, JobError> {
        self.update_status(job_id, JobUpdate::new().output(kind, record)).await
    }

    /// Mark a job cancelled unless it already reached a terminal state
    pub async fn cancel_if_active(&self, job_id: &str) -> Result<Job, JobError> {
        self.load(job_id).await?;
        let lock = self.lock_for(job_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.cancel_locked(job_id).await
        };
        self.release_lock(job_id, lock).await;
        result
    }

    async fn cancel_locked(&self, job_id: &str) -> Result<Job, JobError> {
        let mut job = self.load(job_id).await?;
        if job.status.is_terminal() {
            return Err(JobError::NotCancellable {
                id: job.id,
                status: job.status,
            });
        }
        job.apply(
            JobUpdate::new()
                .status(JobStatus::Cancelled)
                .current_step("Job cancelled by user"),
        );
        job.updated_at = Utc::now();
        self.save(&job).await?;
        tracing::info!(job_id, "🛑 Job cancelled");
        Ok(job)
    }
}
