//! Redis broker.
//!
//! Key layout:
//! - `taskq:queue:{queue}`: list of JSON [`TaskEnvelope`]s (LPUSH / BRPOP, FIFO)
//! - `taskq:task:{task_id}`: JSON [`TaskRecord`], expires after the result TTL
//! - `taskq:group:{group_id}`: JSON [`GroupHandle`], expires after the result TTL

use crate::{
    GroupHandle, GroupStatus, QueueError, QueueResult, TaskBroker, TaskEnvelope, TaskRecord,
    TaskSignature,
};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Shared Redis connection manager
pub type SharedRedis = Arc<Mutex<ConnectionManager>>;

const KEY_PREFIX: &str = "taskq";

/// Records and handles live one day, then read back as pending/unknown
pub const DEFAULT_RESULT_TTL_SECS: u64 = 86_400;

#[derive(Clone)]
pub struct RedisBroker {
    redis: SharedRedis,
    /// Separate connection for BRPOP so a blocked pop never stalls record writes
    blocking: SharedRedis,
    result_ttl_secs: u64,
}

impl RedisBroker {
    pub async fn connect(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client.clone()).await?;
        let blocking = ConnectionManager::new(client).await?;

        Ok(Self {
            redis: Arc::new(Mutex::new(manager)),
            blocking: Arc::new(Mutex::new(blocking)),
            result_ttl_secs: DEFAULT_RESULT_TTL_SECS,
        })
    }

    /// Reuse an existing manager for both regular and blocking commands
    pub fn with_manager(manager: SharedRedis) -> Self {
        Self {
            redis: manager.clone(),
            blocking: manager,
            result_ttl_secs: DEFAULT_RESULT_TTL_SECS,
        }
    }

    pub fn with_result_ttl(mut self, ttl_secs: u64) -> Self {
        self.result_ttl_secs = ttl_secs;
        self
    }

    fn queue_key(queue: &str) -> String {
        format!("{KEY_PREFIX}:queue:{queue}")
    }

    fn task_key(task_id: Uuid) -> String {
        format!("{KEY_PREFIX}:task:{task_id}")
    }

    fn group_key(group_id: Uuid) -> String {
        format!("{KEY_PREFIX}:group:{group_id}")
    }

    async fn load_records(&self, handle: &GroupHandle) -> QueueResult<Vec<TaskRecord>> {
        if handle.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = handle.task_ids.iter().map(|id| Self::task_key(*id)).collect();
        let raw: Vec<Option<String>> = {
            let mut conn = self.redis.lock().await;
            redis::cmd("MGET").arg(&keys).query_async(&mut *conn).await?
        };

        raw.into_iter()
            .map(|value| match value {
                Some(json) => serde_json::from_str(&json).map_err(QueueError::from),
                None => Ok(TaskRecord::pending()),
            })
            .collect()
    }
}

#[async_trait]
impl TaskBroker for RedisBroker {
    async fn enqueue_batch(
        &self,
        queue: &str,
        signatures: Vec<TaskSignature>,
    ) -> QueueResult<GroupHandle> {
        if signatures.is_empty() {
            return Err(QueueError::EmptyGroup);
        }

        let group_id = Uuid::new_v4();
        let envelopes: Vec<TaskEnvelope> = signatures
            .into_iter()
            .map(|signature| TaskEnvelope {
                task_id: Uuid::new_v4(),
                group_id,
                signature,
                attempt: 0,
            })
            .collect();

        let payloads = envelopes
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        {
            let mut conn = self.redis.lock().await;
            conn.lpush::<_, _, ()>(Self::queue_key(queue), payloads)
                .await?;
        }

        debug!(group_id = %group_id, queue = %queue, size = envelopes.len(), "Task group enqueued");

        Ok(GroupHandle {
            group_id,
            task_ids: envelopes.iter().map(|e| e.task_id).collect(),
        })
    }

    async fn save_group(&self, handle: &GroupHandle) -> QueueResult<()> {
        let payload = serde_json::to_string(handle)?;
        let mut conn = self.redis.lock().await;
        conn.set_ex::<_, _, ()>(Self::group_key(handle.group_id), payload, self.result_ttl_secs)
            .await?;
        Ok(())
    }

    async fn restore_group(&self, group_id: Uuid) -> QueueResult<Option<GroupHandle>> {
        let raw: Option<String> = {
            let mut conn = self.redis.lock().await;
            conn.get(Self::group_key(group_id)).await?
        };
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(QueueError::from)
    }

    async fn poll_status(&self, handle: &GroupHandle) -> QueueResult<GroupStatus> {
        let records = self.load_records(handle).await?;
        Ok(GroupStatus::from_states(records.iter().map(|r| r.state)))
    }

    async fn collect_results(&self, handle: &GroupHandle) -> QueueResult<Vec<TaskRecord>> {
        self.load_records(handle).await
    }

    async fn forget(&self, handle: &GroupHandle) -> QueueResult<()> {
        let mut keys: Vec<String> = handle.task_ids.iter().map(|id| Self::task_key(*id)).collect();
        keys.push(Self::group_key(handle.group_id));

        let mut conn = self.redis.lock().await;
        conn.del::<_, ()>(keys).await?;

        debug!(group_id = %handle.group_id, "Task group forgotten");
        Ok(())
    }

    async fn dequeue(&self, queue: &str, timeout: Duration) -> QueueResult<Option<TaskEnvelope>> {
        let key = Self::queue_key(queue);
        let payload: Option<String> = if timeout.is_zero() {
            // BRPOP treats 0 as "block forever"
            let mut conn = self.redis.lock().await;
            conn.rpop(&key, None).await?
        } else {
            let mut conn = self.blocking.lock().await;
            let popped: Option<(String, String)> = redis::cmd("BRPOP")
                .arg(&key)
                .arg(timeout.as_secs_f64())
                .query_async(&mut *conn)
                .await?;
            popped.map(|(_, payload)| payload)
        };

        payload
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(QueueError::from)
    }

    async fn requeue(&self, queue: &str, envelope: &TaskEnvelope) -> QueueResult<()> {
        let payload = serde_json::to_string(envelope)?;
        let mut conn = self.redis.lock().await;
        conn.lpush::<_, _, ()>(Self::queue_key(queue), payload).await?;
        Ok(())
    }

    async fn set_record(&self, task_id: Uuid, record: &TaskRecord) -> QueueResult<()> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.redis.lock().await;
        conn.set_ex::<_, _, ()>(Self::task_key(task_id), payload, self.result_ttl_secs)
            .await?;
        Ok(())
    }
}
