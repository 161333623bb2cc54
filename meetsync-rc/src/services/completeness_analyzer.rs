//! Completeness analyzer
//!
//! Compares the remote result count of a meet with the local count. Source
//! failures yield a `failed` verdict that is never complete, so an outage
//! leads to reprocessing rather than to a false completion.

use std::sync::Arc;

use crate::db::ResultStore;
use crate::error::{SyncError, SyncResult};
use crate::models::{CompletenessVerdict, MeetFilter, MeetRecord};
use crate::services::completion_ledger::{CompletionLedger, SkipOptions};
use crate::source::SourceAdapter;

pub struct CompletenessAnalyzer {
    store: Arc<dyn ResultStore>,
    source: Arc<dyn SourceAdapter>,
}

impl CompletenessAnalyzer {
    pub fn new(store: Arc<dyn ResultStore>, source: Arc<dyn SourceAdapter>) -> Self {
        Self { store, source }
    }

    /// Analyze one meet by local id
    pub async fn analyze(&self, meet_id: i64) -> SyncResult<CompletenessVerdict> {
        let meet = self
            .store
            .read_meet(meet_id)
            .await?
            .ok_or_else(|| SyncError::ValidationError(format!("meet {} not found", meet_id)))?;
        self.analyze_meet(&meet).await
    }

    /// Analyze an already loaded meet
    pub async fn analyze_meet(&self, meet: &MeetRecord) -> SyncResult<CompletenessVerdict> {
        let Some(remote_id) = meet.remote_id.as_deref() else {
            tracing::debug!(meet_id = meet.local_id, "Meet has no remote id");
            return Ok(CompletenessVerdict::failed(
                meet.local_id,
                "meet has no remote id",
            ));
        };

        let remote_count = match self.source.get_result_count(remote_id).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(
                    meet_id = meet.local_id,
                    remote_id,
                    error = %e,
                    "Remote count unavailable, verdict failed"
                );
                return Ok(CompletenessVerdict::failed(meet.local_id, e.to_string()));
            }
        };

        let local_count = self.store.count_local_results(meet.local_id).await?;
        let verdict = CompletenessVerdict::from_counts(meet.local_id, remote_count, local_count);

        tracing::debug!(
            meet_id = meet.local_id,
            remote_count,
            local_count,
            discrepancy = verdict.discrepancy,
            is_complete = verdict.is_complete,
            "Completeness verdict"
        );
        Ok(verdict)
    }

    /// Non-complete verdicts for the filter's meets, in store order
    pub async fn get_incomplete_meets(
        &self,
        filter: &MeetFilter,
    ) -> SyncResult<Vec<CompletenessVerdict>> {
        filter.validate()?;
        let meets = self.store.list_candidate_meets(filter).await?;

        let mut incomplete = Vec::new();
        for meet in &meets {
            let verdict = self.analyze_meet(meet).await?;
            if !verdict.is_complete {
                incomplete.push(verdict);
            }
        }
        Ok(incomplete)
    }

    /// Like `get_incomplete_meets`, but meets the ledger skips are not analyzed
    ///
    /// Complete verdicts found along the way are recorded in the ledger.
    pub async fn get_incomplete_meets_skipping(
        &self,
        filter: &MeetFilter,
        ledger: &mut CompletionLedger,
        opts: SkipOptions,
    ) -> SyncResult<Vec<CompletenessVerdict>> {
        filter.validate()?;
        let meets = self.store.list_candidate_meets(filter).await?;

        let mut incomplete = Vec::new();
        for meet in &meets {
            if ledger.should_skip(meet.local_id, opts).await? {
                continue;
            }
            let verdict = self.analyze_meet(meet).await?;
            if verdict.is_complete {
                ledger.mark_complete(&verdict).await?;
            } else {
                incomplete.push(verdict);
            }
        }
        Ok(incomplete)
    }

    /// Always-recompute completeness check; use the ledger in loops
    pub async fn should_skip(&self, meet_id: i64) -> SyncResult<bool> {
        Ok(self.analyze(meet_id).await?.is_complete)
    }
}
