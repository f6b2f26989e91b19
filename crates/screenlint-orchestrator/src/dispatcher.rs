//! One worker per device; jobs submitted to it run one after another

use screenlint_core::{Result, ScreenlintError};
use screenlint_device::ShellExecutor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::job::{JobOrchestrator, JobOutcome};

/// Serializes jobs onto the device owned by its orchestrator
///
/// Each outcome is handed to the receiver returned by [`JobDispatcher::start`] as soon as
/// its job ends; the worker keeps nothing between jobs.
pub struct JobDispatcher {
    sender: mpsc::UnboundedSender<Uuid>,
    worker: JoinHandle<()>,
}

impl JobDispatcher {
    /// Start the worker task
    pub fn start<E>(
        orchestrator: Arc<JobOrchestrator<E>>,
    ) -> (Self, mpsc::UnboundedReceiver<JobOutcome>)
    where
        E: ShellExecutor + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Uuid>();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel::<JobOutcome>();

        let worker = tokio::spawn(async move {
            while let Some(job_id) = receiver.recv().await {
                debug!("Worker picked up job {}", job_id);
                match orchestrator.execute(job_id).await {
                    Ok(outcome) => {
                        if outcome_tx.send(outcome).is_err() {
                            debug!("Outcome of job {} dropped, nobody is listening", job_id);
                        }
                    }
                    Err(e) => error!("Job {} not run: {}", job_id, e),
                }
            }
            info!("Worker for {} stopped", orchestrator.serial());
        });

        (Self { sender, worker }, outcome_rx)
    }

    /// Queue a job and return its id without waiting for it to run
    pub fn submit(&self, job_id: Uuid) -> Result<Uuid> {
        self.sender
            .send(job_id)
            .map_err(|_| ScreenlintError::Other("job worker has stopped".to_string()))?;
        Ok(job_id)
    }

    /// Stop accepting jobs and wait for the queued ones to finish
    pub async fn shutdown(self) -> Result<()> {
        drop(self.sender);
        self.worker
            .await
            .map_err(|e| ScreenlintError::Other(format!("job worker failed: {}", e)))
    }
}
