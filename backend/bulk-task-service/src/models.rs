/// Request and response payloads
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Returned by every submitting endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub group_id: Uuid,
    /// 1 when the final poll should republish the bucket manifest
    pub should_update_version: u8,
}

/// Outcome of polling a group
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// Unknown id, or the group was already finalized
    NotFound,
    /// `percent` is `(total - pending) / total` with two decimals, e.g. "0.67"
    Running { percent: String },
    Finalized(GroupSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunningResponse {
    pub percent: String,
}

/// Elapsed seconds since submission, or a marker when the start time is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecTime {
    Seconds(i64),
    NotCalculated,
}

impl Serialize for ExecTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExecTime::Seconds(secs) => serializer.serialize_i64(*secs),
            ExecTime::NotCalculated => serializer.serialize_str("Not calculated"),
        }
    }
}

/// Number of members sharing an error kind or result value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub kind: String,
    pub num: usize,
}

/// Final report of a group, produced exactly once
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    /// Always 1
    pub percent: u8,
    pub successful: usize,
    pub failed: usize,
    pub exec_time: ExecTime,
    pub error_messages: Vec<TypeCount>,
    pub results: Vec<TypeCount>,
}

/// Body of `POST /api/v1/tasks/assets/{action}`
#[derive(Debug, Clone, Deserialize)]
pub struct AssetSelection {
    pub assets: Vec<crate::assets::Asset>,
}
