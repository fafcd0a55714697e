use serde::{Deserialize, Serialize};
use std::fmt;

/// Query specification posted to `/v1/query`.
///
/// Serializes to the wire shape `{"type": ..., "filters": {"from": ..., "to": ...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct QuerySpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub filters: TimeRange,
}

/// Closed date range filter, absolute RFC 3339 timestamps.
#[derive(Debug, Clone, Serialize)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
}

impl QuerySpec {
    /// An "indices" query over a closed time range.
    pub fn indices(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            kind: "indices".to_string(),
            filters: TimeRange {
                from: from.into(),
                to: to.into(),
            },
        }
    }
}

/// Lifecycle state of a submitted query job.
///
/// `Submitted`, `InProgress` and `Running` are one pending state under three
/// wire labels. Anything the API sends that is not a known label lands in
/// `Unknown` and is treated as a terminal failure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum JobStatus {
    Submitted,
    InProgress,
    Running,
    Completed,
    Failed,
    Cancelled,
    Unknown(String),
}

impl From<String> for JobStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "SUBMITTED" => JobStatus::Submitted,
            "IN_PROGRESS" => JobStatus::InProgress,
            "RUNNING" => JobStatus::Running,
            "COMPLETED" => JobStatus::Completed,
            "FAILED" => JobStatus::Failed,
            "CANCELLED" => JobStatus::Cancelled,
            _ => JobStatus::Unknown(raw),
        }
    }
}

impl JobStatus {
    /// The job has been accepted but has not reached a terminal state yet.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            JobStatus::Submitted | JobStatus::InProgress | JobStatus::Running
        )
    }

    /// Terminal success; only this state leads to a download.
    pub fn is_complete(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Unknown(raw) => raw.as_str(),
        };
        f.write_str(label)
    }
}

// Reply bodies. The API omits fields on some responses; absent strings
// deserialize to "" to match the documented contract.

#[derive(Debug, Deserialize)]
pub(crate) struct TokenReply {
    #[serde(default)]
    pub(crate) access_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitReply {
    #[serde(default, rename = "queryId")]
    pub(crate) query_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusReply {
    #[serde(default)]
    status: Option<JobStatus>,
}

impl StatusReply {
    pub(crate) fn into_status(self) -> JobStatus {
        self.status
            .unwrap_or_else(|| JobStatus::Unknown("NO_STATUS_RETURNED".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultLocationReply {
    #[serde(default)]
    pub(crate) uri: String,
}
