//! Completion ledger
//!
//! Durable per-meet memory of completeness verdicts, answering "skip this
//! meet?" without a remote call.
//!
//! Per-meet state machine:
//! ```text
//! unknown → complete | incomplete | failed
//! complete → incomplete   (only when a local-count check detects drift)
//! ```
//!
//! The cache is owned by one ledger instance and lives for one run. A ledger
//! row that cannot be read is treated as `unknown` (nothing is skipped).

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{ledger, ResultStore};
use crate::error::{SyncError, SyncResult};
use crate::models::{CompletenessStatus, CompletenessVerdict};

/// Failed-check messages kept per entry
const MAX_ERROR_LOG: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipOptions {
    /// Ignore the cache and the stored verdict
    pub force_recheck: bool,
    /// Re-count local results of meets stored as complete
    pub verify_counts: bool,
}

impl Default for SkipOptions {
    fn default() -> Self {
        Self {
            force_recheck: false,
            verify_counts: true,
        }
    }
}

pub struct CompletionLedger {
    pool: SqlitePool,
    store: Arc<dyn ResultStore>,
    cache: HashMap<i64, CompletenessVerdict>,
}

impl CompletionLedger {
    pub fn new(pool: SqlitePool, store: Arc<dyn ResultStore>) -> Self {
        Self {
            pool,
            store,
            cache: HashMap::new(),
        }
    }

    /// Stored entry, or None when missing or unreadable
    async fn load(&self, meet_id: i64) -> Option<CompletenessVerdict> {
        match ledger::load_entry(&self.pool, meet_id).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(meet_id, error = %e, "Ledger entry unreadable, treating as unknown");
                None
            }
        }
    }

    async fn current(&self, meet_id: i64) -> Option<CompletenessVerdict> {
        match self.cache.get(&meet_id) {
            Some(entry) => Some(entry.clone()),
            None => self.load(meet_id).await,
        }
    }

    async fn persist(&mut self, entry: CompletenessVerdict) -> SyncResult<()> {
        let outcome = ledger::upsert_entry(&self.pool, &entry).await;
        if let Err(e) = &outcome {
            tracing::error!(meet_id = entry.meet_id, error = %e, "Failed to persist ledger entry");
        }
        self.cache.insert(entry.meet_id, entry);
        outcome
    }

    /// True when the meet is known complete and need not be reprocessed
    pub async fn should_skip(&mut self, meet_id: i64, opts: SkipOptions) -> SyncResult<bool> {
        if opts.force_recheck {
            self.cache.remove(&meet_id);
            return Ok(false);
        }

        if let Some(cached) = self.cache.get(&meet_id) {
            return Ok(cached.status == CompletenessStatus::Complete);
        }

        let Some(entry) = self.load(meet_id).await else {
            return Ok(false);
        };

        if entry.status != CompletenessStatus::Complete {
            self.cache.insert(meet_id, entry);
            return Ok(false);
        }

        if !opts.verify_counts {
            self.cache.insert(meet_id, entry);
            return Ok(true);
        }

        let local_count = match self.store.count_local_results(meet_id).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(meet_id, error = %e, "Local count unavailable, not skipping");
                return Ok(false);
            }
        };

        if local_count == entry.local_count {
            self.cache.insert(meet_id, entry);
            return Ok(true);
        }

        tracing::warn!(
            meet_id,
            stored_local = entry.local_count,
            current_local = local_count,
            remote = entry.remote_count,
            "Local result count changed since completion, demoting to incomplete"
        );

        let demoted = CompletenessVerdict {
            local_count,
            is_complete: false,
            discrepancy: i64::from(entry.remote_count) - i64::from(local_count),
            status: CompletenessStatus::Incomplete,
            last_checked_at: Utc::now(),
            completed_at: None,
            ..entry
        };
        if let Err(e) = ledger::upsert_entry(&self.pool, &demoted).await {
            tracing::error!(meet_id, error = %e, "Failed to persist ledger demotion");
        }
        // Full remote recheck happens on the next analysis
        self.cache.remove(&meet_id);
        Ok(false)
    }

    /// Record a verdict whose counts matched
    pub async fn mark_complete(&mut self, verdict: &CompletenessVerdict) -> SyncResult<()> {
        if !verdict.is_complete || verdict.remote_count != verdict.local_count {
            return Err(SyncError::ValidationError(format!(
                "meet {} cannot be marked complete: remote {} != local {}",
                verdict.meet_id, verdict.remote_count, verdict.local_count
            )));
        }

        let first_completed_at = self
            .current(verdict.meet_id)
            .await
            .filter(|e| e.status == CompletenessStatus::Complete)
            .and_then(|e| e.completed_at);

        let entry = CompletenessVerdict {
            status: CompletenessStatus::Complete,
            completed_at: first_completed_at
                .or(verdict.completed_at)
                .or_else(|| Some(Utc::now())),
            ..verdict.clone()
        };
        self.persist(entry).await
    }

    pub async fn mark_incomplete(&mut self, verdict: &CompletenessVerdict) -> SyncResult<()> {
        if verdict.is_complete {
            return Err(SyncError::ValidationError(format!(
                "meet {} verdict is complete, use mark_complete",
                verdict.meet_id
            )));
        }

        let entry = CompletenessVerdict {
            status: CompletenessStatus::Incomplete,
            completed_at: None,
            ..verdict.clone()
        };
        self.persist(entry).await
    }

    /// Record a check that could not reach the source
    ///
    /// A complete entry stays complete.
    pub async fn mark_failed(&mut self, meet_id: i64, error: &str) -> SyncResult<()> {
        let existing = self.current(meet_id).await;

        if let Some(entry) = &existing {
            if entry.status == CompletenessStatus::Complete {
                tracing::debug!(meet_id, error, "Check failed for complete meet, keeping status");
                return Ok(());
            }
        }

        let mut entry = CompletenessVerdict::failed(meet_id, error);
        if let Some(previous) = existing {
            let mut log = previous.error_log;
            log.push(error.to_string());
            let excess = log.len().saturating_sub(MAX_ERROR_LOG);
            log.drain(..excess);
            entry.error_log = log;
        }
        self.persist(entry).await
    }

    pub async fn entry(&self, meet_id: i64) -> SyncResult<Option<CompletenessVerdict>> {
        if let Some(cached) = self.cache.get(&meet_id) {
            return Ok(Some(cached.clone()));
        }
        ledger::load_entry(&self.pool, meet_id).await
    }

    pub async fn entries(&self) -> SyncResult<Vec<CompletenessVerdict>> {
        ledger::list_entries(&self.pool).await
    }

    pub fn invalidate(&mut self, meet_id: i64) {
        self.cache.remove(&meet_id);
    }
}
