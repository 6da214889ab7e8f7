//! Pool of worker tasks pulling dispatch messages from the task queue.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::pipeline::Pipeline;
use crate::services::queue::{DispatchMessage, QueueError, TaskQueue, MAX_DELIVERIES};

#[derive(Debug, Error)]
pub enum WorkerPoolError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),
}

#[derive(Clone, Debug)]
pub struct WorkerPoolConfig {
    /// Number of jobs processed concurrently.
    pub workers: usize,

    /// Sleep between polls while the queue is empty.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Worker tasks running the pipeline for dequeued jobs.
///
/// Call [`WorkerPool::shutdown`] to stop polling; each worker finishes the
/// job it is currently running first.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl WorkerPool {
    #[must_use = "worker pool must be stored to keep workers running"]
    pub fn spawn(
        pipeline: Arc<Pipeline>,
        queue: Arc<dyn TaskQueue>,
        config: WorkerPoolConfig,
    ) -> Result<Self, WorkerPoolError> {
        if config.workers == 0 {
            return Err(WorkerPoolError::InvalidConfig(
                "workers must be greater than 0".into(),
            ));
        }

        if config.poll_interval.is_zero() {
            return Err(WorkerPoolError::InvalidConfig(
                "poll_interval must be greater than 0".into(),
            ));
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let mut workers = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let pipeline = Arc::clone(&pipeline);
            let queue = Arc::clone(&queue);
            let poll_interval = config.poll_interval;
            let mut shutdown_rx = shutdown_tx.subscribe();

            let handle = tokio::spawn(async move {
                debug!(worker_id, "Worker starting");

                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        debug!(worker_id, "Worker received shutdown signal");
                        break;
                    }

                    match process_next(&pipeline, queue.as_ref()).await {
                        Ok(true) => {}
                        Ok(false) => {
                            record_depth(queue.as_ref()).await;
                            tokio::time::sleep(poll_interval).await;
                        }
                        Err(e) => {
                            error!(worker_id, error = %e, "Failed to poll dispatch queue");
                            tokio::time::sleep(poll_interval).await;
                        }
                    }
                }

                debug!(worker_id, "Worker shutting down");
            });

            workers.push(handle);
        }

        tracing::info!(workers = config.workers, "Worker pool started");
        Ok(Self {
            workers,
            shutdown_tx,
        })
    }

    /// Signal every worker to stop and wait for them to exit.
    pub async fn shutdown(self) -> Result<(), WorkerPoolError> {
        let _ = self.shutdown_tx.send(());

        for (idx, handle) in self.workers.into_iter().enumerate() {
            handle.await.map_err(|e| {
                WorkerPoolError::WorkerPanicked(format!("Worker {} panicked: {}", idx, e))
            })?;
        }

        tracing::info!("All workers shut down successfully");
        Ok(())
    }
}

/// Take one message off the queue and run it. Returns `false` when the queue
/// was empty.
pub async fn process_next(pipeline: &Pipeline, queue: &dyn TaskQueue) -> Result<bool, QueueError> {
    let Some(message) = queue.dequeue().await? else {
        return Ok(false);
    };

    handle_delivery(pipeline, queue, &message).await?;
    Ok(true)
}

async fn handle_delivery(
    pipeline: &Pipeline,
    queue: &dyn TaskQueue,
    message: &DispatchMessage,
) -> Result<(), QueueError> {
    match pipeline.run(message.job_id).await {
        Ok(outcome) => {
            debug!(
                job_id = %message.job_id,
                delivery = message.delivery,
                outcome = ?outcome,
                "Delivery handled"
            );
        }
        Err(e) if e.is_redeliverable() && message.delivery < MAX_DELIVERIES => {
            warn!(
                job_id = %message.job_id,
                delivery = message.delivery,
                error = %e,
                "Pipeline could not reach the job store, redelivering"
            );
            queue.enqueue(&message.redelivery()).await?;
        }
        Err(e) => {
            error!(
                job_id = %message.job_id,
                delivery = message.delivery,
                error = %e,
                "Dropping dispatch"
            );
        }
    }

    queue.ack(message).await
}

async fn record_depth(queue: &dyn TaskQueue) {
    if let Ok(depth) = queue.depth().await {
        metrics::gauge!("media_queue_depth").set(depth as f64);
    }
}
