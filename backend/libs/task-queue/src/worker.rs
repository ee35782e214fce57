//! Queue consumer executing registered tasks.
//!
//! This component:
//! - Pops envelopes from one queue
//! - Records `STARTED`, runs the handler, then records the terminal outcome
//! - Re-queues retryable failures with exponential backoff up to `max_retries`
//! - Bounds concurrent executions with a semaphore

use crate::metrics::WorkerMetrics;
use crate::registry::TaskRegistry;
use crate::{
    QueueResult, TaskBroker, TaskEnvelope, TaskOutcome, TaskRecord, TaskState, LOW_PRIORITY_QUEUE,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

const MAX_BACKOFF_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue: String,
    /// Maximum tasks executing at once
    pub concurrency: usize,
    /// Re-runs allowed for a retryable failure
    pub max_retries: u32,
    /// Backoff before retry `n` is `backoff_base * 2^n`, capped at 5 minutes
    pub backoff_base: Duration,
    /// How long a single dequeue blocks before checking for shutdown
    pub poll_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: LOW_PRIORITY_QUEUE.to_string(),
            concurrency: 4,
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct Worker {
    broker: Arc<dyn TaskBroker>,
    registry: Arc<TaskRegistry>,
    config: WorkerConfig,
    metrics: Option<WorkerMetrics>,
}

impl Worker {
    pub fn new(broker: Arc<dyn TaskBroker>, registry: TaskRegistry, config: WorkerConfig) -> Self {
        Self {
            broker,
            registry: Arc::new(registry),
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: WorkerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Consume the queue until `shutdown` flips to true.
    ///
    /// Broker errors are logged and the loop keeps going; in-flight tasks are
    /// awaited before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> QueueResult<()> {
        info!(
            queue = %self.config.queue,
            concurrency = self.config.concurrency,
            max_retries = self.config.max_retries,
            tasks = ?self.registry.names(),
            "Task worker starting"
        );

        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut in_flight = tokio::task::JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                changed = shutdown.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => break,
                },
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let envelope = tokio::select! {
                changed = shutdown.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => break,
                },
                popped = self.broker.dequeue(&self.config.queue, self.config.poll_timeout) => popped,
            };

            match envelope {
                Ok(Some(envelope)) => {
                    let worker = self.clone();
                    in_flight.spawn(async move {
                        worker.execute(envelope).await;
                        drop(permit);
                    });
                }
                Ok(None) => debug!(queue = %self.config.queue, "No tasks to run"),
                Err(e) => {
                    error!(error = ?e, "Failed to dequeue task");
                    tokio::time::sleep(self.config.poll_timeout).await;
                }
            }

            while in_flight.try_join_next().is_some() {}
        }

        info!(remaining = in_flight.len(), "Task worker draining in-flight tasks");
        while in_flight.join_next().await.is_some() {}
        info!("Task worker stopped");
        Ok(())
    }

    /// Execute queued tasks inline until the queue is empty.
    ///
    /// Returns the number of envelopes processed, retries included.
    pub async fn drain(&self) -> QueueResult<usize> {
        let mut processed = 0;
        while let Some(envelope) = self.broker.dequeue(&self.config.queue, Duration::ZERO).await? {
            self.execute(envelope).await;
            processed += 1;
        }
        Ok(processed)
    }

    /// Run one envelope to a recorded state. Never fails: broker errors while
    /// recording are logged, as the task itself already ran.
    pub async fn execute(&self, envelope: TaskEnvelope) {
        let task_id = envelope.task_id;
        let task = envelope.signature.task.clone();

        if let Err(e) = self
            .broker
            .set_record(task_id, &TaskRecord::with_state(TaskState::Started))
            .await
        {
            warn!(task_id = %task_id, error = ?e, "Failed to mark task as started");
        }
        if let Some(metrics) = &self.metrics {
            metrics.in_flight.inc();
        }

        let result = self
            .registry
            .dispatch(&task, &envelope.signature.args)
            .await;

        if let Some(metrics) = &self.metrics {
            metrics.in_flight.dec();
        }

        let record = match result {
            Ok(value) => {
                debug!(task_id = %task_id, task = %task, "Task succeeded");
                if let Some(metrics) = &self.metrics {
                    metrics.succeeded.inc();
                }
                TaskRecord::finished(TaskOutcome::Success(value))
            }
            Err(failure) if failure.retryable && envelope.attempt < self.config.max_retries => {
                warn!(
                    task_id = %task_id,
                    task = %task,
                    attempt = envelope.attempt,
                    max_retries = self.config.max_retries,
                    error = %failure,
                    "Task failed, retrying"
                );
                self.schedule_retry(envelope).await;
                return;
            }
            Err(failure) => {
                error!(
                    task_id = %task_id,
                    task = %task,
                    attempt = envelope.attempt,
                    error = %failure,
                    "Task failed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.failed.inc();
                }
                TaskRecord::finished(TaskOutcome::Error(failure))
            }
        };

        if let Err(e) = self.broker.set_record(task_id, &record).await {
            error!(task_id = %task_id, error = ?e, "Failed to store task result");
        }
    }

    async fn schedule_retry(&self, mut envelope: TaskEnvelope) {
        if let Err(e) = self
            .broker
            .set_record(envelope.task_id, &TaskRecord::with_state(TaskState::Retry))
            .await
        {
            warn!(task_id = %envelope.task_id, error = ?e, "Failed to mark task for retry");
        }
        if let Some(metrics) = &self.metrics {
            metrics.retried.inc();
        }

        let delay = self.calculate_backoff(envelope.attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        envelope.attempt += 1;
        if let Err(e) = self.broker.requeue(&self.config.queue, &envelope).await {
            error!(task_id = %envelope.task_id, error = ?e, "Failed to re-queue task");
        }
    }

    /// `backoff_base * 2^attempt`, capped at 5 minutes
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.config
            .backoff_base
            .saturating_mul(factor)
            .min(Duration::from_secs(MAX_BACKOFF_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBroker;

    #[test]
    fn test_backoff_calculation() {
        let worker = Worker::new(
            Arc::new(MemoryBroker::new()),
            TaskRegistry::new(),
            WorkerConfig::default(),
        );

        assert_eq!(worker.calculate_backoff(0).as_secs(), 1);
        assert_eq!(worker.calculate_backoff(1).as_secs(), 2);
        assert_eq!(worker.calculate_backoff(2).as_secs(), 4);
        assert_eq!(worker.calculate_backoff(5).as_secs(), 32);
        assert_eq!(worker.calculate_backoff(10).as_secs(), 300); // capped
        assert_eq!(worker.calculate_backoff(40).as_secs(), 300);
    }
}
