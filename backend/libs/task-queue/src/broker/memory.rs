//! In-process broker for tests and single-binary development setups.

use crate::{
    GroupHandle, GroupStatus, QueueError, QueueResult, TaskBroker, TaskEnvelope, TaskRecord,
    TaskSignature,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<TaskEnvelope>>,
    records: HashMap<Uuid, TaskRecord>,
    groups: HashMap<Uuid, GroupHandle>,
}

#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<State>,
    enqueued: Notify,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of envelopes waiting on `queue`
    pub fn queued(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map(VecDeque::len).unwrap_or(0)
    }

    /// Stored record of a member, if any
    pub fn record(&self, task_id: Uuid) -> Option<TaskRecord> {
        self.lock().records.get(&task_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, queue: &str, envelope: TaskEnvelope) {
        self.lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(envelope);
        self.enqueued.notify_waiters();
    }

    fn pop(&self, queue: &str) -> Option<TaskEnvelope> {
        self.lock().queues.get_mut(queue).and_then(VecDeque::pop_front)
    }

    fn records_of(&self, handle: &GroupHandle) -> Vec<TaskRecord> {
        let state = self.lock();
        handle
            .task_ids
            .iter()
            .map(|id| state.records.get(id).cloned().unwrap_or_else(TaskRecord::pending))
            .collect()
    }
}

#[async_trait]
impl TaskBroker for MemoryBroker {
    async fn enqueue_batch(
        &self,
        queue: &str,
        signatures: Vec<TaskSignature>,
    ) -> QueueResult<GroupHandle> {
        if signatures.is_empty() {
            return Err(QueueError::EmptyGroup);
        }

        let group_id = Uuid::new_v4();
        let mut task_ids = Vec::with_capacity(signatures.len());
        for signature in signatures {
            let task_id = Uuid::new_v4();
            task_ids.push(task_id);
            self.push(
                queue,
                TaskEnvelope {
                    task_id,
                    group_id,
                    signature,
                    attempt: 0,
                },
            );
        }

        Ok(GroupHandle { group_id, task_ids })
    }

    async fn save_group(&self, handle: &GroupHandle) -> QueueResult<()> {
        self.lock().groups.insert(handle.group_id, handle.clone());
        Ok(())
    }

    async fn restore_group(&self, group_id: Uuid) -> QueueResult<Option<GroupHandle>> {
        Ok(self.lock().groups.get(&group_id).cloned())
    }

    async fn poll_status(&self, handle: &GroupHandle) -> QueueResult<GroupStatus> {
        Ok(GroupStatus::from_states(
            self.records_of(handle).iter().map(|r| r.state),
        ))
    }

    async fn collect_results(&self, handle: &GroupHandle) -> QueueResult<Vec<TaskRecord>> {
        Ok(self.records_of(handle))
    }

    async fn forget(&self, handle: &GroupHandle) -> QueueResult<()> {
        let mut state = self.lock();
        state.groups.remove(&handle.group_id);
        for id in &handle.task_ids {
            state.records.remove(id);
        }
        Ok(())
    }

    async fn dequeue(&self, queue: &str, timeout: Duration) -> QueueResult<Option<TaskEnvelope>> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.enqueued.notified();
            if let Some(envelope) = self.pop(queue) {
                return Ok(Some(envelope));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.pop(queue));
            }
        }
    }

    async fn requeue(&self, queue: &str, envelope: &TaskEnvelope) -> QueueResult<()> {
        self.push(queue, envelope.clone());
        Ok(())
    }

    async fn set_record(&self, task_id: Uuid, record: &TaskRecord) -> QueueResult<()> {
        self.lock().records.insert(task_id, record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TaskOutcome, TaskState};
    use serde_json::Value;

    #[tokio::test]
    async fn test_enqueue_preserves_fifo_order() {
        let broker = MemoryBroker::new();
        let handle = broker
            .enqueue_batch(
                "q",
                vec![TaskSignature::new("a", vec![]), TaskSignature::new("b", vec![])],
            )
            .await
            .unwrap();

        assert_eq!(handle.len(), 2);
        assert_eq!(broker.queued("q"), 2);

        let first = broker.dequeue("q", Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(first.signature.task, "a");
        assert_eq!(first.task_id, handle.task_ids[0]);
        assert_eq!(first.group_id, handle.group_id);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let broker = MemoryBroker::new();
        assert!(matches!(
            broker.enqueue_batch("q", vec![]).await,
            Err(QueueError::EmptyGroup)
        ));
    }

    #[tokio::test]
    async fn test_dequeue_times_out_on_empty_queue() {
        let broker = MemoryBroker::new();
        let popped = broker.dequeue("q", Duration::from_millis(10)).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn test_unwritten_members_read_as_pending() {
        let broker = MemoryBroker::new();
        let handle = broker
            .enqueue_batch("q", vec![TaskSignature::new("a", vec![])])
            .await
            .unwrap();

        let status = broker.poll_status(&handle).await.unwrap();
        assert_eq!(status.pending, 1);
        assert!(status.waiting());
    }

    #[tokio::test]
    async fn test_forget_drops_group_and_records() {
        let broker = MemoryBroker::new();
        let handle = broker
            .enqueue_batch("q", vec![TaskSignature::new("a", vec![])])
            .await
            .unwrap();
        broker.save_group(&handle).await.unwrap();
        broker
            .set_record(
                handle.task_ids[0],
                &TaskRecord::finished(TaskOutcome::Success(Value::Null)),
            )
            .await
            .unwrap();
        assert_eq!(
            broker.record(handle.task_ids[0]).map(|r| r.state),
            Some(TaskState::Success)
        );

        broker.forget(&handle).await.unwrap();

        assert!(broker.restore_group(handle.group_id).await.unwrap().is_none());
        assert!(broker.record(handle.task_ids[0]).is_none());
    }
}
