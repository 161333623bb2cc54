//! Reconciliation session state
//!
//! A session is created per orchestrator run and finalized at run end:
//! RUNNING → COMPLETED | CANCELLED | FAILED

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    /// Working set is being processed
    Running,
    /// Every item was visited
    Completed,
    /// Stopped at a batch/item boundary on request
    Cancelled,
    /// Aborted before processing (configuration or working set error)
    Failed,
}

/// State transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: SessionState,
    pub new_state: SessionState,
    pub transitioned_at: DateTime<Utc>,
}

/// Aggregated counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    /// Meets visited (skipped ones included)
    pub processed: usize,
    /// Meets verified complete during this run
    pub completed: usize,
    /// Meets skipped on the ledger's word
    pub skipped: usize,
    /// Meets whose processing raised an error
    pub failed: usize,
    /// Results added by the re-import step
    pub results_added: usize,
    /// Results backfilled by the resolver
    pub results_resolved: usize,
    /// Results that exhausted every tier this run
    pub results_unresolved: usize,
    /// Results skipped because they are already on the unresolved list
    pub results_skipped_unresolved: usize,
    /// Individual fields written by the resolver
    pub fields_filled: usize,
}

/// Progress tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProgress {
    /// Meets processed so far
    pub current: usize,
    /// Meets in the working set
    pub total: usize,
    /// Percentage complete (0.0 - 100.0)
    pub percentage: f64,
    /// Current operation description
    pub current_operation: String,
    pub elapsed_seconds: u64,
    /// None until at least one item finished
    pub estimated_remaining_seconds: Option<u64>,
}

impl Default for SessionProgress {
    fn default() -> Self {
        Self {
            current: 0,
            total: 0,
            percentage: 0.0,
            current_operation: String::from("Initializing..."),
            elapsed_seconds: 0,
            estimated_remaining_seconds: None,
        }
    }
}

/// What happened to one working set item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Skipped,
    Complete,
    Incomplete,
    Failed,
}

/// Per-item log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemLogEntry {
    pub meet_id: i64,
    pub meet_name: Option<String>,
    pub outcome: ItemOutcome,
    pub discrepancy: Option<i64>,
    pub results_added: usize,
    pub results_resolved: usize,
    pub logged_at: DateTime<Utc>,
}

/// Error captured at the orchestrator boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionError {
    pub meet_id: Option<i64>,
    /// Stage that failed (e.g., "analyze", "reimport", "resolve")
    pub context: String,
    /// Error category (see `SyncError::kind`)
    pub kind: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl SessionError {
    pub fn new(
        meet_id: Option<i64>,
        context: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            meet_id,
            context: context.into(),
            kind: kind.into(),
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

/// Reconciliation session (in-memory state)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSession {
    pub session_id: Uuid,
    pub state: SessionState,
    pub counters: SessionCounters,
    pub progress: SessionProgress,
    pub item_log: Vec<ItemLogEntry>,
    pub errors: Vec<SessionError>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SyncSession {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: SessionState::Running,
            counters: SessionCounters::default(),
            progress: SessionProgress::default(),
            item_log: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: SessionState) -> StateTransition {
        let transition = StateTransition {
            session_id: self.session_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if self.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        transition
    }

    /// Update progress
    pub fn update_progress(&mut self, current: usize, total: usize, operation: String) {
        self.progress.current = current;
        self.progress.total = total;
        self.progress.percentage = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        self.progress.current_operation = operation;

        let elapsed = (Utc::now() - self.started_at).num_seconds().max(0) as u64;
        self.progress.elapsed_seconds = elapsed;

        if current > 0 && total > current {
            let rate = elapsed as f64 / current as f64;
            let remaining = ((total - current) as f64 * rate) as u64;
            self.progress.estimated_remaining_seconds = Some(remaining);
        } else {
            self.progress.estimated_remaining_seconds = None;
        }
    }

    pub fn add_error(&mut self, error: SessionError) {
        self.errors.push(error);
    }

    pub fn log_item(&mut self, entry: ItemLogEntry) {
        self.item_log.push(entry);
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }

    /// Wall-clock duration so far, or total duration once terminal
    pub fn elapsed_seconds(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        ((end - self.started_at).num_milliseconds().max(0) as f64) / 1000.0
    }
}

impl Default for SyncSession {
    fn default() -> Self {
        Self::new()
    }
}
