// src/jobs/worker.rs
//! Fixed-size pool of tokio workers pulling job ids from a shared queue.

use super::video_job::{Pipeline, PipelineOutcome};
use crate::error::{JobError, StageError};
use crate::models::{JobId, StepName, StepStatus};
use std::any::Any;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

pub struct WorkerPool {
    /// `None` once the pool is stopped
    sender: Mutex<Option<mpsc::UnboundedSender<JobId>>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(worker_count: usize, pipeline: Arc<Pipeline>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..worker_count.max(1))
            .map(|worker| tokio::spawn(worker_loop(worker, receiver.clone(), pipeline.clone())))
            .collect();
        tracing::info!("👷 Started {} pipeline workers", worker_count.max(1));
        Self {
            sender: Mutex::new(Some(sender)),
            handles,
        }
    }

    pub async fn submit(&self, job_id: JobId) -> Result<(), JobError> {
        let sender = self.sender.lock().await;
        let sender = sender.as_ref().ok_or(JobError::QueueClosed)?;
        sender.send(job_id).map_err(|_| JobError::QueueClosed)
    }

    /// Close the queue. Workers drain what is already queued, then exit.
    pub async fn stop(&self) {
        if self.sender.lock().await.take().is_some() {
            tracing::info!("Job queue closed");
        }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn worker_loop(worker: usize, receiver: Arc<Mutex<mpsc::UnboundedReceiver<JobId>>>, pipeline: Arc<Pipeline>) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(job_id) = next else {
            tracing::debug!(worker, "Job queue closed, worker exiting");
            break;
        };
        run_job(worker, &pipeline, job_id).await;
    }
}

/// Run one job in its own task so a panic is caught as a `JoinError`
/// instead of taking the worker down.
async fn run_job(worker: usize, pipeline: &Arc<Pipeline>, job_id: JobId) {
    tracing::debug!(worker, job_id = %job_id, "Picked up job");
    let task_pipeline = pipeline.clone();
    let task_job_id = job_id.clone();
    let result = tokio::spawn(async move { task_pipeline.run(&task_job_id).await }).await;

    let diagnostic = match result {
        Ok(Ok(PipelineOutcome::Completed)) => return,
        Ok(Ok(PipelineOutcome::Cancelled)) => {
            tracing::info!(job_id = %job_id, "🛑 Pipeline stopped for cancelled job");
            return;
        }
        Ok(Ok(PipelineOutcome::Failed(error))) => {
            tracing::warn!(job_id = %job_id, stage = %error.stage, "Pipeline failed: {}", error.message);
            return;
        }
        Ok(Err(e)) => format!("Error during processing: {}", e),
        Err(join_error) if join_error.is_panic() => {
            format!("Error during processing: panic: {}", panic_message(join_error.into_panic()))
        }
        Err(join_error) => format!("Error during processing: {}", join_error),
    };

    tracing::error!(worker, job_id = %job_id, "{}", diagnostic);
    record_unexpected_failure(pipeline, &job_id, diagnostic).await;
}

/// Charge an unexpected failure to the stage that was running, so the job
/// never stays `processing`
async fn record_unexpected_failure(pipeline: &Pipeline, job_id: &str, diagnostic: String) {
    let stage = match pipeline.store().get_job(job_id).await {
        Ok(job) if job.status.is_terminal() => return,
        Ok(job) => job
            .active_step()
            .or_else(|| {
                job.steps
                    .iter()
                    .find(|step| step.status != StepStatus::Completed)
                    .map(|step| step.name)
            })
            .unwrap_or(StepName::Rendering),
        Err(e) => {
            tracing::error!(job_id, "Cannot record failure, job unreadable: {}", e);
            return;
        }
    };

    if let Err(e) = pipeline.record_failure(job_id, &StageError::new(stage, diagnostic)).await {
        tracing::error!(job_id, "Failed to record job failure: {}", e);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
