//! Final report of a finished group.
//!
//! Finalization tallies member outcomes, optionally republishes the bucket
//! manifest, then always drops the group's start timestamp and forgets the
//! group, whether or not the earlier steps succeeded. Only the poll holding
//! the group's finalization claim runs these steps.

use crate::cache::{finalizing_key, parse_timestamp, timestart_key, TrackingCache};
use crate::error::Result;
use crate::models::{ExecTime, GroupSummary, TypeCount};
use cdn_bucket::Bucket;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use task_queue::{GroupHandle, TaskBroker, TaskOutcome, TaskRecord, TaskState};
use tracing::{debug, error, info, warn};

/// How long a finalization claim outlives a successful cleanup
pub const FINALIZE_CLAIM_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct ResultAggregator {
    broker: Arc<dyn TaskBroker>,
    cache: Arc<dyn TrackingCache>,
    bucket: Bucket,
}

impl ResultAggregator {
    pub fn new(broker: Arc<dyn TaskBroker>, cache: Arc<dyn TrackingCache>, bucket: Bucket) -> Self {
        Self {
            broker,
            cache,
            bucket,
        }
    }

    /// Claim the group, then summarize, republish if asked and clean up.
    ///
    /// Returns `None` when another caller already holds the claim. Errors
    /// are reported in step order (summary, republish, cleanup) but never
    /// skip the cleanup.
    pub async fn finalize(
        &self,
        handle: &GroupHandle,
        republish: bool,
    ) -> Result<Option<GroupSummary>> {
        let claim = finalizing_key(&handle.group_id.to_string());
        if !self.cache.set_if_absent(&claim, "1", FINALIZE_CLAIM_TTL).await? {
            debug!(group_id = %handle.group_id, "Task group already being finalized");
            return Ok(None);
        }

        let summary = self.summarize(handle).await;

        let republished = if republish {
            self.bucket.republish_manifest().await.map(|_| ())
        } else {
            Ok(())
        };
        if let Err(e) = &republished {
            error!(group_id = %handle.group_id, error = %e, "Manifest republish failed");
        }

        let cleaned = self.cleanup(handle).await;

        let summary = summary?;
        republished?;
        cleaned?;

        info!(
            group_id = %handle.group_id,
            successful = summary.successful,
            failed = summary.failed,
            republish,
            "Task group finalized"
        );
        Ok(Some(summary))
    }

    async fn summarize(&self, handle: &GroupHandle) -> Result<GroupSummary> {
        let records = self.broker.collect_results(handle).await?;
        let exec_time = self.exec_time(handle).await?;
        Ok(summarize_records(&records, exec_time))
    }

    async fn exec_time(&self, handle: &GroupHandle) -> Result<ExecTime> {
        let key = timestart_key(&handle.group_id.to_string());
        let Some(raw) = self.cache.get(&key).await? else {
            return Ok(ExecTime::NotCalculated);
        };

        match parse_timestamp(&raw) {
            Some(started) => {
                let elapsed = Utc::now().signed_duration_since(started).num_seconds();
                Ok(ExecTime::Seconds(elapsed.max(0)))
            }
            None => {
                warn!(group_id = %handle.group_id, raw = %raw, "Unparseable group start timestamp");
                Ok(ExecTime::NotCalculated)
            }
        }
    }

    /// Delete the timestamp and forget the group; both are attempted
    async fn cleanup(&self, handle: &GroupHandle) -> Result<()> {
        let key = timestart_key(&handle.group_id.to_string());
        let deleted = self.cache.delete(&key).await;
        if let Err(e) = &deleted {
            error!(group_id = %handle.group_id, error = %e, "Failed to delete group timestamp");
        }

        let forgotten = self.broker.forget(handle).await;
        if let Err(e) = &forgotten {
            error!(group_id = %handle.group_id, error = ?e, "Failed to forget task group");
            // the group is still saved, so let a later poll finalize it
            let claim = finalizing_key(&handle.group_id.to_string());
            if let Err(e) = self.cache.delete(&claim).await {
                warn!(
                    group_id = %handle.group_id,
                    error = %e,
                    "Failed to release finalization claim"
                );
            }
        }

        deleted?;
        forgotten?;
        Ok(())
    }
}

/// Tally terminal states and group outcomes by category
pub fn summarize_records(records: &[TaskRecord], exec_time: ExecTime) -> GroupSummary {
    let successful = records.iter().filter(|r| r.state == TaskState::Success).count();
    let failed = records.iter().filter(|r| r.state == TaskState::Failure).count();

    let mut errors: BTreeMap<String, usize> = BTreeMap::new();
    let mut results: BTreeMap<String, usize> = BTreeMap::new();
    for outcome in records.iter().filter_map(|r| r.outcome.as_ref()) {
        let tally = match outcome {
            TaskOutcome::Error(_) => &mut errors,
            TaskOutcome::Success(_) => &mut results,
        };
        *tally.entry(outcome.category()).or_default() += 1;
    }

    GroupSummary {
        percent: 1,
        successful,
        failed,
        exec_time,
        error_messages: into_counts(errors),
        results: into_counts(results),
    }
}

fn into_counts(counts: BTreeMap<String, usize>) -> Vec<TypeCount> {
    counts
        .into_iter()
        .map(|(kind, num)| TypeCount { kind, num })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use task_queue::TaskFailure;

    fn failure(kind: &str) -> TaskRecord {
        TaskRecord::finished(TaskOutcome::Error(TaskFailure::new(kind, "boom")))
    }

    fn success(value: Value) -> TaskRecord {
        TaskRecord::finished(TaskOutcome::Success(value))
    }

    #[test]
    fn test_summarize_groups_by_category() {
        let records = vec![
            success(Value::Null),
            failure("RuntimeError"),
            success(Value::Null),
            failure("AlreadyExists"),
            failure("RuntimeError"),
            success(json!("ok")),
        ];

        let summary = summarize_records(&records, ExecTime::Seconds(4));

        assert_eq!(summary.successful, 3);
        assert_eq!(summary.failed, 3);
        assert_eq!(
            summary.error_messages,
            vec![
                TypeCount { kind: "AlreadyExists".to_string(), num: 1 },
                TypeCount { kind: "RuntimeError".to_string(), num: 2 },
            ]
        );
        assert_eq!(
            summary.results,
            vec![
                TypeCount { kind: "null".to_string(), num: 2 },
                TypeCount { kind: "ok".to_string(), num: 1 },
            ]
        );
    }

    #[test]
    fn test_summarize_empty_lists() {
        let summary = summarize_records(&[success(Value::Null)], ExecTime::NotCalculated);
        assert_eq!(summary.percent, 1);
        assert!(summary.error_messages.is_empty());
        assert_eq!(summary.exec_time, ExecTime::NotCalculated);
    }
}
