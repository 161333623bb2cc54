//! Session reporting
//!
//! Periodic progress snapshots while a run is going, and the derived
//! statistics written to the session summary at the end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::SyncResult;
use crate::models::{ItemLogEntry, SessionCounters, SessionError, SessionState, SyncSession};

/// Point-in-time progress of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub total: usize,
    pub percentage: f64,
    pub elapsed_seconds: u64,
    pub estimated_remaining_seconds: Option<u64>,
    pub counters: SessionCounters,
}

impl ProgressSnapshot {
    pub fn display_string(&self) -> String {
        format!(
            "{} of {} meets ({:.1}%), {} skipped, {} failed",
            self.processed,
            self.total,
            self.percentage,
            self.counters.skipped,
            self.counters.failed
        )
    }
}

/// Emits a snapshot every `interval` processed items
#[derive(Debug)]
pub struct SessionReporter {
    interval: usize,
    snapshots: Vec<ProgressSnapshot>,
}

impl SessionReporter {
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
            snapshots: Vec::new(),
        }
    }

    /// Snapshot the session if it just crossed an interval boundary or finished
    pub fn observe(&mut self, session: &SyncSession) -> Option<&ProgressSnapshot> {
        let processed = session.progress.current;
        let total = session.progress.total;
        if processed == 0 || (processed % self.interval != 0 && processed != total) {
            return None;
        }

        let snapshot = ProgressSnapshot {
            processed,
            total,
            percentage: session.progress.percentage,
            elapsed_seconds: session.progress.elapsed_seconds,
            estimated_remaining_seconds: session.progress.estimated_remaining_seconds,
            counters: session.counters.clone(),
        };
        tracing::info!(
            session_id = %session.session_id,
            processed,
            total,
            elapsed_seconds = snapshot.elapsed_seconds,
            eta_seconds = ?snapshot.estimated_remaining_seconds,
            "Progress: {}",
            snapshot.display_string()
        );
        self.snapshots.push(snapshot);
        self.snapshots.last()
    }

    pub fn snapshots(&self) -> &[ProgressSnapshot] {
        &self.snapshots
    }
}

/// Final session summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub counters: SessionCounters,
    /// Share of attempted (non-skipped) meets that did not fail, 0.0 - 1.0
    pub success_rate: f64,
    /// Meets processed per minute of wall-clock time
    pub throughput_per_minute: f64,
    /// Results added or resolved per attempted meet
    pub average_results_per_meet: f64,
    pub errors: Vec<SessionError>,
    pub items: Vec<ItemLogEntry>,
    #[serde(skip)]
    pub summary_path: Option<PathBuf>,
}

impl SessionReport {
    pub fn from_session(session: &SyncSession) -> Self {
        let counters = session.counters.clone();
        let duration_seconds = session.elapsed_seconds();
        let attempted = counters.processed.saturating_sub(counters.skipped);

        let success_rate = if attempted > 0 {
            attempted.saturating_sub(counters.failed) as f64 / attempted as f64
        } else {
            0.0
        };
        let throughput_per_minute = if duration_seconds > 0.0 {
            counters.processed as f64 / (duration_seconds / 60.0)
        } else {
            0.0
        };
        let average_results_per_meet = if attempted > 0 {
            (counters.results_added + counters.results_resolved) as f64 / attempted as f64
        } else {
            0.0
        };

        Self {
            session_id: session.session_id,
            state: session.state,
            started_at: session.started_at,
            ended_at: session.ended_at,
            duration_seconds,
            counters,
            success_rate,
            throughput_per_minute,
            average_results_per_meet,
            errors: session.errors.clone(),
            items: session.item_log.clone(),
            summary_path: None,
        }
    }

    /// Write `<dir>/<session_id>.json` and remember the path
    pub fn write_summary(&mut self, dir: &Path) -> SyncResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.session_id));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        self.summary_path = Some(path.clone());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(processed: usize, skipped: usize, failed: usize, resolved: usize) -> SyncSession {
        let mut session = SyncSession::new();
        session.counters.processed = processed;
        session.counters.skipped = skipped;
        session.counters.failed = failed;
        session.counters.results_resolved = resolved;
        session
    }

    #[test]
    fn test_report_rates() {
        let mut session = session_with(10, 2, 2, 16);
        session.transition_to(SessionState::Completed);
        let report = SessionReport::from_session(&session);

        assert_eq!(report.success_rate, 0.75);
        assert_eq!(report.average_results_per_meet, 2.0);
        assert!(report.throughput_per_minute >= 0.0);
    }

    #[test]
    fn test_empty_run_rates_are_zero() {
        let report = SessionReport::from_session(&session_with(0, 0, 0, 0));
        assert_eq!(report.success_rate, 0.0);
        assert_eq!(report.average_results_per_meet, 0.0);
    }

    #[test]
    fn test_snapshot_every_interval_and_at_end() {
        let mut reporter = SessionReporter::new(2);
        let mut session = SyncSession::new();
        let mut emitted = Vec::new();
        for current in 1..=5 {
            session.update_progress(current, 5, "processing".to_string());
            if reporter.observe(&session).is_some() {
                emitted.push(current);
            }
        }
        assert_eq!(emitted, vec![2, 4, 5]);
        assert_eq!(reporter.snapshots().len(), 3);
    }

    #[test]
    fn test_summary_written_as_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut report = SessionReport::from_session(&session_with(3, 1, 0, 4));
        let path = report.write_summary(&dir.path().join("sessions")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["counters"]["processed"], 3);
        assert_eq!(report.summary_path.as_deref(), Some(path.as_path()));
    }
}
