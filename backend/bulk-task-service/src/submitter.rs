/// Fans a batch of signatures out as one task group
use crate::cache::{format_timestamp, timestart_key, TrackingCache};
use crate::error::{AppError, Result};
use crate::models::SubmitResponse;
use chrono::Utc;
use std::sync::Arc;
use task_queue::{TaskBroker, TaskSignature};
use tracing::info;

#[derive(Clone)]
pub struct TaskGroupSubmitter {
    broker: Arc<dyn TaskBroker>,
    cache: Arc<dyn TrackingCache>,
    queue: String,
}

impl TaskGroupSubmitter {
    pub fn new(broker: Arc<dyn TaskBroker>, cache: Arc<dyn TrackingCache>, queue: impl Into<String>) -> Self {
        Self {
            broker,
            cache,
            queue: queue.into(),
        }
    }

    /// Submit `signatures` as one group and start its clock.
    ///
    /// An empty batch creates nothing and fails with [`AppError::NothingToDo`].
    pub async fn submit(
        &self,
        signatures: Vec<TaskSignature>,
        should_republish: bool,
    ) -> Result<SubmitResponse> {
        if signatures.is_empty() {
            return Err(AppError::NothingToDo);
        }

        let size = signatures.len();
        let handle = self.broker.enqueue_batch(&self.queue, signatures).await?;
        self.broker.save_group(&handle).await?;

        self.record_start(&handle.group_id.to_string()).await?;

        info!(
            group_id = %handle.group_id,
            queue = %self.queue,
            size,
            should_republish,
            "Task group submitted"
        );

        Ok(SubmitResponse {
            group_id: handle.group_id,
            should_update_version: u8::from(should_republish),
        })
    }

    /// Stamp the group's start time unless one is already recorded.
    ///
    /// The first recorded start time is kept. Exists and set are separate
    /// round-trips, so a concurrent writer for the same id can still
    /// overwrite it in between.
    async fn record_start(&self, group_id: &str) -> Result<()> {
        let key = timestart_key(group_id);
        if !self.cache.exists(&key).await? {
            self.cache.set(&key, &format_timestamp(Utc::now())).await?;
        }
        Ok(())
    }
}
