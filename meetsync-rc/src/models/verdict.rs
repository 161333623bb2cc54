//! Completeness verdicts
//!
//! A verdict compares the remote result count of one meet with the local count.
//! `is_complete` holds exactly when both counts are equal at check time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ledger state of a meet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletenessStatus {
    Unknown,
    Complete,
    Incomplete,
    Failed,
}

impl CompletenessStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Complete => "complete",
            Self::Incomplete => "incomplete",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unknown" => Some(Self::Unknown),
            "complete" => Some(Self::Complete),
            "incomplete" => Some(Self::Incomplete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Outcome of one completeness check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessVerdict {
    pub meet_id: i64,
    pub remote_count: u32,
    pub local_count: u32,
    pub is_complete: bool,
    /// remote_count - local_count
    pub discrepancy: i64,
    pub status: CompletenessStatus,
    pub last_checked_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_log: Vec<String>,
}

impl CompletenessVerdict {
    /// Verdict from a successful count comparison
    pub fn from_counts(meet_id: i64, remote_count: u32, local_count: u32) -> Self {
        let is_complete = remote_count == local_count;
        let now = Utc::now();
        Self {
            meet_id,
            remote_count,
            local_count,
            is_complete,
            discrepancy: i64::from(remote_count) - i64::from(local_count),
            status: if is_complete {
                CompletenessStatus::Complete
            } else {
                CompletenessStatus::Incomplete
            },
            last_checked_at: now,
            completed_at: if is_complete { Some(now) } else { None },
            error_log: Vec::new(),
        }
    }

    /// Verdict for a check that could not reach the source
    ///
    /// Counts are zeroed and the meet is never reported complete.
    pub fn failed(meet_id: i64, error: impl Into<String>) -> Self {
        Self {
            meet_id,
            remote_count: 0,
            local_count: 0,
            is_complete: false,
            discrepancy: 0,
            status: CompletenessStatus::Failed,
            last_checked_at: Utc::now(),
            completed_at: None,
            error_log: vec![error.into()],
        }
    }

    /// Same counts and status, ignoring timestamps and error text
    pub fn same_outcome(&self, other: &CompletenessVerdict) -> bool {
        self.meet_id == other.meet_id
            && self.remote_count == other.remote_count
            && self.local_count == other.local_count
            && self.is_complete == other.is_complete
            && self.discrepancy == other.discrepancy
            && self.status == other.status
    }
}
