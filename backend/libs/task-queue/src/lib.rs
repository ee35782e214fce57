//! # Task groups over a Redis work queue
//!
//! A producer turns a list of [`TaskSignature`]s into one task group with
//! [`TaskBroker::enqueue_batch`]. Workers pop envelopes off the queue, run the
//! named handler and record a terminal [`TaskRecord`] per member. Any process
//! that knows the group id can restore the [`GroupHandle`], poll its
//! [`GroupStatus`] and, once nothing is left pending, collect every member's
//! outcome and forget the group.
//!
//! ```rust,no_run
//! use task_queue::{RedisBroker, TaskBroker, TaskSignature};
//!
//! # async fn run(broker: RedisBroker) -> task_queue::QueueResult<()> {
//! let signatures = vec![
//!     TaskSignature::immutable("bucket.push_file", vec!["messages.json".into(), true.into()]),
//!     TaskSignature::immutable("bucket.push_file", vec!["messagelevels.json".into(), true.into()]),
//! ];
//! let handle = broker.enqueue_batch("Z_lopri_Q", signatures).await?;
//! broker.save_group(&handle).await?;
//!
//! let status = broker.poll_status(&handle).await?;
//! println!("{} of {} left the pending state", status.total - status.pending, status.total);
//! # Ok(())
//! # }
//! ```
//!
//! Execution is at-least-once: a worker that dies mid-task leaves the member
//! pending until the queue redelivers it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

pub mod broker;
mod error;
pub mod metrics;
pub mod registry;
pub mod worker;

pub use broker::memory::MemoryBroker;
pub use broker::redis::RedisBroker;
pub use error::{QueueError, QueueResult};
pub use metrics::WorkerMetrics;
pub use registry::{TaskHandler, TaskRegistry};
pub use worker::{Worker, WorkerConfig};

/// Queue every bulk administrative job is submitted to
pub const LOW_PRIORITY_QUEUE: &str = "Z_lopri_Q";

/// A deferred invocation of a registered task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSignature {
    /// Registered task name (e.g. "bucket.push_file")
    pub task: String,

    /// Positional arguments
    pub args: Vec<Value>,

    /// Composition must not append upstream results to `args`
    pub immutable: bool,
}

impl TaskSignature {
    pub fn new(task: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            task: task.into(),
            args,
            immutable: false,
        }
    }

    pub fn immutable(task: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            immutable: true,
            ..Self::new(task, args)
        }
    }
}

/// Lifecycle of one group member.
///
/// Members with no stored record are reported as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Started,
    Retry,
    Success,
    Failure,
}

impl TaskState {
    /// Terminal states; a group stops waiting once every member is ready
    pub fn is_ready(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

/// Failure raised by a task handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Category name, e.g. "RuntimeError" or "AlreadyExists"
    pub kind: String,
    pub message: String,
    /// Whether the worker may re-run the task
    #[serde(default)]
    pub retryable: bool,
}

impl TaskFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of one finished member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success(Value),
    Error(TaskFailure),
}

impl TaskOutcome {
    /// Name used when tallying outcomes: the failure kind, or the rendered
    /// return value for successes.
    pub fn category(&self) -> String {
        match self {
            TaskOutcome::Error(failure) => failure.kind.clone(),
            TaskOutcome::Success(Value::String(s)) => s.clone(),
            TaskOutcome::Success(value) => value.to_string(),
        }
    }
}

/// Stored state of one member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub state: TaskState,
    pub outcome: Option<TaskOutcome>,
}

impl TaskRecord {
    pub fn pending() -> Self {
        Self {
            state: TaskState::Pending,
            outcome: None,
        }
    }

    pub fn with_state(state: TaskState) -> Self {
        Self {
            state,
            outcome: None,
        }
    }

    pub fn finished(outcome: TaskOutcome) -> Self {
        let state = match outcome {
            TaskOutcome::Success(_) => TaskState::Success,
            TaskOutcome::Error(_) => TaskState::Failure,
        };
        Self {
            state,
            outcome: Some(outcome),
        }
    }
}

/// Queue message delivered to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: Uuid,
    pub group_id: Uuid,
    pub signature: TaskSignature,
    /// Zero for the first delivery
    #[serde(default)]
    pub attempt: u32,
}

/// Restorable handle of a submitted group; member order is submission order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupHandle {
    pub group_id: Uuid,
    pub task_ids: Vec<Uuid>,
}

impl GroupHandle {
    pub fn len(&self) -> usize {
        self.task_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.task_ids.is_empty()
    }
}

/// Point-in-time counts for a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStatus {
    pub total: usize,
    /// Members not yet picked up by a worker
    pub pending: usize,
    /// Members in a terminal state
    pub ready: usize,
}

impl GroupStatus {
    pub fn from_states<I: IntoIterator<Item = TaskState>>(states: I) -> Self {
        let mut status = GroupStatus {
            total: 0,
            pending: 0,
            ready: 0,
        };
        for state in states {
            status.total += 1;
            if state == TaskState::Pending {
                status.pending += 1;
            }
            if state.is_ready() {
                status.ready += 1;
            }
        }
        status
    }

    /// True while any member is not yet in a terminal state
    pub fn waiting(&self) -> bool {
        self.ready < self.total
    }

    /// Fraction of members that have left the pending state
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.total - self.pending) as f64 / self.total as f64
    }
}

/// Work-queue abstraction shared by producers, pollers and workers.
///
/// Implementations must be idempotent for `forget` and tolerate polling a
/// group whose members have not been written yet.
#[async_trait]
pub trait TaskBroker: Send + Sync {
    /// Push every signature onto `queue` as members of one new group.
    ///
    /// Fails with [`QueueError::EmptyGroup`] for an empty batch.
    async fn enqueue_batch(
        &self,
        queue: &str,
        signatures: Vec<TaskSignature>,
    ) -> QueueResult<GroupHandle>;

    /// Persist the handle so `restore_group` works from another process.
    async fn save_group(&self, handle: &GroupHandle) -> QueueResult<()>;

    /// Load a saved handle; `None` for unknown or forgotten groups.
    async fn restore_group(&self, group_id: Uuid) -> QueueResult<Option<GroupHandle>>;

    /// Count pending and finished members.
    async fn poll_status(&self, handle: &GroupHandle) -> QueueResult<GroupStatus>;

    /// Current record of every member, in submission order.
    async fn collect_results(&self, handle: &GroupHandle) -> QueueResult<Vec<TaskRecord>>;

    /// Drop the saved handle and all member records.
    async fn forget(&self, handle: &GroupHandle) -> QueueResult<()>;

    /// Pop the next envelope, waiting up to `timeout`.
    async fn dequeue(&self, queue: &str, timeout: Duration) -> QueueResult<Option<TaskEnvelope>>;

    /// Put an envelope back at the tail of `queue`.
    async fn requeue(&self, queue: &str, envelope: &TaskEnvelope) -> QueueResult<()>;

    /// Overwrite a member's record.
    async fn set_record(&self, task_id: Uuid, record: &TaskRecord) -> QueueResult<()>;
}
