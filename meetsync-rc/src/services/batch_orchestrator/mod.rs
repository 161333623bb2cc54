//! Batch orchestrator
//!
//! Drives analyzer, ledger and resolver over a working set of meets.
//!
//! # Per meet
//! 1. Ledger `should_skip` → skipped
//! 2. Analyze → complete: `mark_complete`
//! 3. Incomplete → optional re-import, re-analyze, record verdict
//! 4. Resolver over the meet's results needing backfill
//!
//! Meets are processed one at a time in fixed-size batches with a pause
//! between batches. A failure on one meet is recorded in the session and the
//! run moves on. Cancellation is checked between batches and between meets.

mod statistics;

pub use statistics::{ProgressSnapshot, SessionReport, SessionReporter};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::BatchConfig;
use crate::db::{sessions, ResultStore};
use crate::error::{SyncError, SyncResult};
use crate::models::{
    CompletenessStatus, CompletenessVerdict, ItemLogEntry, ItemOutcome, MeetFilter, MeetRecord,
    SessionError, SessionState, SyncSession,
};
use crate::services::completeness_analyzer::CompletenessAnalyzer;
use crate::services::completion_ledger::{CompletionLedger, SkipOptions};
use crate::services::identity_resolver::TieredResolver;
use crate::source::SourceAdapter;

/// Re-import step for meets with missing results
///
/// Returns the number of results added.
#[async_trait]
pub trait MeetReprocessor: Send + Sync {
    async fn reprocess(&self, meet: &MeetRecord, verdict: &CompletenessVerdict)
        -> SyncResult<usize>;
}

/// Working set selection and ledger options for one run
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub filter: MeetFilter,
    pub skip: SkipOptions,
}

impl RunRequest {
    pub fn from_config(filter: MeetFilter, batch: &BatchConfig) -> Self {
        Self {
            filter,
            skip: SkipOptions {
                force_recheck: batch.force_recheck,
                verify_counts: batch.verify_counts,
            },
        }
    }
}

/// Stage that failed, plus the error
type StageError = (&'static str, SyncError);

pub struct BatchOrchestrator {
    pool: SqlitePool,
    store: Arc<dyn ResultStore>,
    analyzer: CompletenessAnalyzer,
    resolver: TieredResolver,
    reprocessor: Option<Arc<dyn MeetReprocessor>>,
    batch: BatchConfig,
    session_dir: PathBuf,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(
        pool: SqlitePool,
        store: Arc<dyn ResultStore>,
        source: Arc<dyn SourceAdapter>,
        resolver: TieredResolver,
        batch: BatchConfig,
        session_dir: PathBuf,
    ) -> Self {
        let analyzer = CompletenessAnalyzer::new(Arc::clone(&store), source);
        Self {
            pool,
            store,
            analyzer,
            resolver,
            reprocessor: None,
            batch,
            session_dir,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_reprocessor(mut self, reprocessor: Arc<dyn MeetReprocessor>) -> Self {
        self.reprocessor = Some(reprocessor);
        self
    }

    /// Token that stops the run at the next batch or meet boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn persist_session(&self, session: &SyncSession) {
        if let Err(e) = sessions::save_session(&self.pool, session).await {
            tracing::error!(session_id = %session.session_id, error = %e, "Failed to save session");
        }
    }

    /// Run one reconciliation session
    ///
    /// An invalid filter fails before anything is written. Any later problem
    /// ends up in the returned report.
    pub async fn run(&self, request: RunRequest) -> SyncResult<SessionReport> {
        request.filter.validate()?;

        let mut session = SyncSession::new();
        tracing::info!(session_id = %session.session_id, filter = ?request.filter, "Starting reconciliation session");
        self.persist_session(&session).await;

        let meets = match self.store.list_candidate_meets(&request.filter).await {
            Ok(meets) => meets,
            Err(e) => {
                tracing::error!(session_id = %session.session_id, error = %e, "Working set unavailable");
                session.add_error(SessionError::new(None, "working_set", e.kind(), e.to_string()));
                session.transition_to(SessionState::Failed);
                return self.finalize(session).await;
            }
        };

        let total = meets.len();
        session.update_progress(0, total, "Starting".to_string());
        let mut ledger = CompletionLedger::new(self.pool.clone(), Arc::clone(&self.store));
        let mut reporter = SessionReporter::new(self.batch.progress_interval);
        let batch_size = self.batch.batch_size.max(1);
        let batch_count = total.div_ceil(batch_size);
        let mut cancelled = false;

        'batches: for (batch_index, batch) in meets.chunks(batch_size).enumerate() {
            if batch_index > 0 && !self.batch.inter_batch_delay().is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.batch.inter_batch_delay()) => {}
                }
            }
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            tracing::info!(
                session_id = %session.session_id,
                batch = batch_index + 1,
                batches = batch_count,
                meets = batch.len(),
                "Processing batch"
            );

            for meet in batch {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break 'batches;
                }

                self.process_meet(meet, &mut ledger, &mut session, request.skip)
                    .await;
                session.counters.processed += 1;
                session.update_progress(
                    session.counters.processed,
                    total,
                    format!("Batch {}/{}: meet {}", batch_index + 1, batch_count, meet.local_id),
                );
                reporter.observe(&session);
            }

            self.persist_session(&session).await;
        }

        if cancelled {
            tracing::warn!(
                session_id = %session.session_id,
                processed = session.counters.processed,
                total,
                "Session cancelled"
            );
            session.transition_to(SessionState::Cancelled);
        } else {
            session.transition_to(SessionState::Completed);
        }
        self.finalize(session).await
    }

    async fn finalize(&self, session: SyncSession) -> SyncResult<SessionReport> {
        self.persist_session(&session).await;

        let mut report = SessionReport::from_session(&session);
        if let Err(e) = report.write_summary(&self.session_dir) {
            tracing::error!(session_id = %session.session_id, error = %e, "Failed to write session summary");
        }

        tracing::info!(
            session_id = %session.session_id,
            state = ?session.state,
            processed = report.counters.processed,
            completed = report.counters.completed,
            skipped = report.counters.skipped,
            failed = report.counters.failed,
            resolved = report.counters.results_resolved,
            unresolved = report.counters.results_unresolved,
            duration_seconds = report.duration_seconds,
            "Session finalized"
        );
        Ok(report)
    }

    async fn process_meet(
        &self,
        meet: &MeetRecord,
        ledger: &mut CompletionLedger,
        session: &mut SyncSession,
        skip: SkipOptions,
    ) {
        let skipped = match ledger.should_skip(meet.local_id, skip).await {
            Ok(skipped) => skipped,
            Err(e) => {
                tracing::warn!(meet_id = meet.local_id, error = %e, "Ledger check failed, processing meet");
                false
            }
        };
        if skipped {
            tracing::debug!(meet_id = meet.local_id, "Ledger reports complete, skipping");
            session.counters.skipped += 1;
            session.log_item(ItemLogEntry {
                meet_id: meet.local_id,
                meet_name: Some(meet.name.clone()),
                outcome: ItemOutcome::Skipped,
                discrepancy: None,
                results_added: 0,
                results_resolved: 0,
                logged_at: Utc::now(),
            });
            return;
        }

        match self.reconcile_meet(meet, ledger, session).await {
            Ok(entry) => session.log_item(entry),
            Err((stage, e)) => {
                tracing::error!(meet_id = meet.local_id, stage, error = %e, "Meet processing failed");
                session.counters.failed += 1;
                session.add_error(SessionError::new(
                    Some(meet.local_id),
                    stage,
                    e.kind(),
                    e.to_string(),
                ));
                session.log_item(ItemLogEntry {
                    meet_id: meet.local_id,
                    meet_name: Some(meet.name.clone()),
                    outcome: ItemOutcome::Failed,
                    discrepancy: None,
                    results_added: 0,
                    results_resolved: 0,
                    logged_at: Utc::now(),
                });
            }
        }
    }

    /// Record a verdict in the ledger; ledger write failures are not fatal
    async fn record_verdict(
        &self,
        meet: &MeetRecord,
        verdict: &CompletenessVerdict,
        ledger: &mut CompletionLedger,
        session: &mut SyncSession,
    ) {
        let outcome = match verdict.status {
            CompletenessStatus::Complete => ledger.mark_complete(verdict).await,
            CompletenessStatus::Failed => {
                ledger
                    .mark_failed(meet.local_id, &verdict.error_log.join("; "))
                    .await
            }
            _ => ledger.mark_incomplete(verdict).await,
        };
        if let Err(e) = outcome {
            session.add_error(SessionError::new(
                Some(meet.local_id),
                "ledger",
                e.kind(),
                e.to_string(),
            ));
        }
    }

    async fn reconcile_meet(
        &self,
        meet: &MeetRecord,
        ledger: &mut CompletionLedger,
        session: &mut SyncSession,
    ) -> Result<ItemLogEntry, StageError> {
        let mut verdict = self
            .analyzer
            .analyze_meet(meet)
            .await
            .map_err(|e| ("analyze", e))?;
        self.record_verdict(meet, &verdict, ledger, session).await;
        check_failed(meet, &verdict, "analyze")?;

        let mut results_added = 0;
        if !verdict.is_complete {
            if let Some(reprocessor) = &self.reprocessor {
                results_added = reprocessor
                    .reprocess(meet, &verdict)
                    .await
                    .map_err(|e| ("reimport", e))?;
                session.counters.results_added += results_added;

                verdict = self
                    .analyzer
                    .analyze_meet(meet)
                    .await
                    .map_err(|e| ("reanalyze", e))?;
                self.record_verdict(meet, &verdict, ledger, session).await;
                check_failed(meet, &verdict, "reanalyze")?;
            }
        }

        if verdict.is_complete {
            session.counters.completed += 1;
        }

        let mut results_resolved = 0;
        if self.batch.resolve_identities {
            let resolution = self
                .resolver
                .resolve_meet(meet)
                .await
                .map_err(|e| ("resolve", e))?;
            results_resolved = resolution.resolved;
            session.counters.results_resolved += resolution.resolved;
            session.counters.results_unresolved += resolution.unresolved;
            session.counters.results_skipped_unresolved += resolution.skipped_unresolved;
            session.counters.fields_filled += resolution.fields_filled;
            for (result_id, e) in resolution.errors {
                session.add_error(SessionError::new(
                    Some(meet.local_id),
                    format!("resolve result {}", result_id),
                    e.kind(),
                    e.to_string(),
                ));
            }
        }

        Ok(ItemLogEntry {
            meet_id: meet.local_id,
            meet_name: Some(meet.name.clone()),
            outcome: if verdict.is_complete {
                ItemOutcome::Complete
            } else {
                ItemOutcome::Incomplete
            },
            discrepancy: Some(verdict.discrepancy),
            results_added,
            results_resolved,
            logged_at: Utc::now(),
        })
    }
}

/// A failed verdict fails the meet
fn check_failed(
    meet: &MeetRecord,
    verdict: &CompletenessVerdict,
    stage: &'static str,
) -> Result<(), StageError> {
    if verdict.status != CompletenessStatus::Failed {
        return Ok(());
    }
    let message = verdict.error_log.join("; ");
    let error = if meet.remote_id.is_none() {
        SyncError::ValidationError(message)
    } else {
        SyncError::SourceUnavailable(message)
    };
    Err((stage, error))
}
