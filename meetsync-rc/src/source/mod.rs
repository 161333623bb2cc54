//! Remote source adapter interface
//!
//! The remote source is a stateful, UI-driven results system. Implementations
//! must be driven by one logical caller at a time: every call runs to
//! completion (navigate → filter → extract) before the next starts.

pub mod http_client;
pub mod retry;

use async_trait::async_trait;
use chrono::NaiveDate;
use meetsync_common::DateWindow;

use crate::error::SyncResult;
use crate::models::{CompetitorCandidate, HistoryEntry};

pub use http_client::HttpSourceAdapter;
pub use retry::{with_retry, RetryPolicy, RetryingSource};

/// Filters for a candidate search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery {
    pub division: String,
    pub window: DateWindow,
    /// Exact-name filter applied by the source; None searches unfiltered
    pub name_filter: Option<String>,
}

impl CandidateQuery {
    pub fn unfiltered(division: impl Into<String>, window: DateWindow) -> Self {
        Self {
            division: division.into(),
            window,
            name_filter: None,
        }
    }

    pub fn with_window(&self, window: DateWindow) -> Self {
        Self {
            window,
            ..self.clone()
        }
    }
}

/// Operations consumed from the remote source
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Number of results the source lists for a meet
    async fn get_result_count(&self, remote_meet_id: &str) -> SyncResult<u32>;

    /// Candidates in a division and date window (paginated and de-duplicated)
    async fn search_candidates(&self, query: &CandidateQuery)
        -> SyncResult<Vec<CompetitorCandidate>>;

    /// Full competition history of one remote competitor
    async fn get_competitor_history(
        &self,
        remote_competitor_id: &str,
    ) -> SyncResult<Vec<HistoryEntry>>;

    /// Date the source records for a competitor at a meet, if listed
    async fn get_recorded_date(
        &self,
        remote_meet_id: &str,
        competitor_name: &str,
    ) -> SyncResult<Option<NaiveDate>>;
}
