/// Client-driven group polling
use crate::aggregator::ResultAggregator;
use crate::error::Result;
use crate::models::Progress;
use std::sync::Arc;
use task_queue::TaskBroker;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct ProgressTracker {
    broker: Arc<dyn TaskBroker>,
    aggregator: ResultAggregator,
}

impl ProgressTracker {
    pub fn new(broker: Arc<dyn TaskBroker>, aggregator: ResultAggregator) -> Self {
        Self { broker, aggregator }
    }

    /// Report progress of `group_id`, finalizing it on the first poll after
    /// every member reached a terminal state.
    ///
    /// Ids that do not parse, were never saved or were already finalized all
    /// read as [`Progress::NotFound`], as does a poll that loses the race to
    /// finalize a group to a concurrent poll.
    pub async fn poll(&self, group_id: &str, should_update_version: bool) -> Result<Progress> {
        let Ok(group_id) = Uuid::parse_str(group_id) else {
            return Ok(Progress::NotFound);
        };
        let Some(handle) = self.broker.restore_group(group_id).await? else {
            return Ok(Progress::NotFound);
        };

        let status = self.broker.poll_status(&handle).await?;
        if status.waiting() {
            let percent = format!("{:.2}", status.progress());
            debug!(group_id = %group_id, percent = %percent, "Task group still running");
            return Ok(Progress::Running { percent });
        }

        match self.aggregator.finalize(&handle, should_update_version).await? {
            Some(summary) => Ok(Progress::Finalized(summary)),
            None => Ok(Progress::NotFound),
        }
    }
}
