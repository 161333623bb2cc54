//! Shared fixtures: scripted source adapter and seeded in-memory store
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use meetsync_common::DateWindow;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use meetsync_rc::config::ResolverConfig;
use meetsync_rc::db::{init_memory_pool, ResultStore, SqliteStore};
use meetsync_rc::models::{
    CompetitorCandidate, CompetitorIdentity, Gender, HistoryEntry, MeetRecord, ResultRecord,
};
use meetsync_rc::services::{
    normalizer_for, AuditLog, Division, DivisionCatalog, TieredResolver,
};
use meetsync_rc::source::{CandidateQuery, SourceAdapter};
use meetsync_rc::{SyncError, SyncResult};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Adapter call as seen by the fake
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Count(String),
    Search { division: String, window: DateWindow },
    History(String),
    RecordedDate { meet: String, name: String },
}

/// Scripted `SourceAdapter` recording every call
///
/// Searches return the scripted candidates of the division whose date lies in
/// the window. Windows longer than `blackout_days` return nothing, like an
/// overloaded source.
#[derive(Default)]
pub struct FakeSource {
    counts: Mutex<HashMap<String, SyncResult<u32>>>,
    candidates: Mutex<Vec<CompetitorCandidate>>,
    histories: Mutex<HashMap<String, Vec<HistoryEntry>>>,
    recorded_dates: Mutex<HashMap<(String, String), NaiveDate>>,
    blackout_days: Mutex<Option<i64>>,
    calls: Mutex<Vec<Call>>,
}

fn clone_result(result: &SyncResult<u32>) -> SyncResult<u32> {
    match result {
        Ok(n) => Ok(*n),
        Err(SyncError::SourceFormatChanged(m)) => Err(SyncError::SourceFormatChanged(m.clone())),
        Err(e) => Err(SyncError::SourceUnavailable(e.to_string())),
    }
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_count(&self, remote_meet_id: &str, count: u32) {
        self.counts
            .lock()
            .unwrap()
            .insert(remote_meet_id.to_string(), Ok(count));
    }

    pub fn fail_count(&self, remote_meet_id: &str) {
        self.counts.lock().unwrap().insert(
            remote_meet_id.to_string(),
            Err(SyncError::SourceUnavailable("navigation timed out".into())),
        );
    }

    pub fn add_candidate(&self, candidate: CompetitorCandidate) {
        self.candidates.lock().unwrap().push(candidate);
    }

    pub fn set_history(&self, remote_competitor_id: &str, entries: Vec<HistoryEntry>) {
        self.histories
            .lock()
            .unwrap()
            .insert(remote_competitor_id.to_string(), entries);
    }

    pub fn set_recorded_date(&self, remote_meet_id: &str, name: &str, date: NaiveDate) {
        self.recorded_dates
            .lock()
            .unwrap()
            .insert((remote_meet_id.to_string(), name.to_string()), date);
    }

    pub fn set_blackout_days(&self, days: i64) {
        *self.blackout_days.lock().unwrap() = Some(days);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn search_windows(&self) -> Vec<DateWindow> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Search { window, .. } => Some(window),
                _ => None,
            })
            .collect()
    }

    pub fn count_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Count(_)))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl SourceAdapter for FakeSource {
    async fn get_result_count(&self, remote_meet_id: &str) -> SyncResult<u32> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Count(remote_meet_id.to_string()));
        match self.counts.lock().unwrap().get(remote_meet_id) {
            Some(result) => clone_result(result),
            None => Err(SyncError::SourceFormatChanged(format!(
                "meet {} not listed",
                remote_meet_id
            ))),
        }
    }

    async fn search_candidates(
        &self,
        query: &CandidateQuery,
    ) -> SyncResult<Vec<CompetitorCandidate>> {
        self.calls.lock().unwrap().push(Call::Search {
            division: query.division.clone(),
            window: query.window,
        });

        if let Some(limit) = *self.blackout_days.lock().unwrap() {
            if query.name_filter.is_none() && query.window.span_days() > limit {
                return Ok(Vec::new());
            }
        }

        Ok(self
            .candidates
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.division == query.division)
            .filter(|c| c.date.map_or(true, |d| query.window.contains(d)))
            .filter(|c| match &query.name_filter {
                Some(name) => c.name.eq_ignore_ascii_case(name),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn get_competitor_history(
        &self,
        remote_competitor_id: &str,
    ) -> SyncResult<Vec<HistoryEntry>> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::History(remote_competitor_id.to_string()));
        Ok(self
            .histories
            .lock()
            .unwrap()
            .get(remote_competitor_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_recorded_date(
        &self,
        remote_meet_id: &str,
        competitor_name: &str,
    ) -> SyncResult<Option<NaiveDate>> {
        self.calls.lock().unwrap().push(Call::RecordedDate {
            meet: remote_meet_id.to_string(),
            name: competitor_name.to_string(),
        });
        Ok(self
            .recorded_dates
            .lock()
            .unwrap()
            .get(&(remote_meet_id.to_string(), competitor_name.to_string()))
            .copied())
    }
}

pub fn meet(local_id: i64, remote_id: Option<&str>, name: &str, date: NaiveDate) -> MeetRecord {
    MeetRecord {
        local_id,
        remote_id: remote_id.map(String::from),
        name: name.to_string(),
        date,
    }
}

/// Result with identity and biographic fields empty
pub fn bare_result(id: i64, meet_id: i64, name: &str, division: &str) -> ResultRecord {
    ResultRecord {
        id,
        meet_id,
        competitor_id: None,
        competitor_name: name.to_string(),
        division: division.to_string(),
        total: None,
        bodyweight: None,
        place: None,
        birth_year: None,
        age: None,
        club: None,
        region: None,
        gender: None,
        remote_competitor_id: None,
        resolved_tier: None,
    }
}

pub fn candidate(name: &str, division: &str, date: NaiveDate) -> CompetitorCandidate {
    CompetitorCandidate {
        name: name.to_string(),
        age: Some(30),
        birth_year: Some(1994),
        club: Some("Iron Club".to_string()),
        region: Some("North".to_string()),
        gender: Some(Gender::Male),
        date: Some(date),
        division: division.to_string(),
        total: None,
        remote_competitor_id: None,
        meet_name: None,
    }
}

pub fn identity(id: i64, name: &str, remote_id: Option<&str>) -> CompetitorIdentity {
    CompetitorIdentity {
        id,
        name: name.to_string(),
        remote_competitor_id: remote_id.map(String::from),
        birth_year: None,
        gender: Some(Gender::Male),
    }
}

pub struct TestStore {
    pub pool: SqlitePool,
    pub store: SqliteStore,
}

impl TestStore {
    pub async fn new() -> Self {
        let pool = init_memory_pool().await.expect("in-memory database");
        let store = SqliteStore::new(pool.clone());
        Self { pool, store }
    }

    pub fn shared(&self) -> Arc<dyn ResultStore> {
        Arc::new(self.store.clone())
    }

    pub async fn add_meet(&self, meet: &MeetRecord) {
        self.store.insert_meet(meet).await.expect("insert meet");
    }

    /// Insert `count` bare results for a meet, ids starting at `first_id`
    pub async fn add_results(&self, meet_id: i64, first_id: i64, count: i64) {
        for id in first_id..first_id + count {
            self.store
                .insert_result(&bare_result(id, meet_id, &format!("Lifter {}", id), "M-OPEN-93"))
                .await
                .expect("insert result");
        }
    }

    pub async fn add_result(&self, result: &ResultRecord) {
        self.store.insert_result(result).await.expect("insert result");
    }

    pub async fn add_identity(&self, identity: &CompetitorIdentity) {
        self.store
            .insert_competitor(identity)
            .await
            .expect("insert competitor");
    }

    pub async fn delete_result(&self, id: i64) {
        sqlx::query("DELETE FROM results WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .expect("delete result");
    }
}

pub fn divisions() -> Vec<Division> {
    let division = |code: &str, gender: Gender, age: &str, weight: f64| Division {
        code: code.to_string(),
        gender,
        age_class: age.to_string(),
        weight_class: Some(weight),
    };
    vec![
        division("M-OPEN-93", Gender::Male, "open", 93.0),
        division("M-OPEN-105", Gender::Male, "open", 105.0),
        division("M-JR-93", Gender::Male, "junior", 93.0),
        division("F-OPEN-84", Gender::Female, "open", 84.0),
    ]
}

pub fn build_resolver(
    test: &TestStore,
    source: Arc<FakeSource>,
    config: ResolverConfig,
    audit_path: &Path,
) -> TieredResolver {
    TieredResolver::new(
        test.shared(),
        source,
        test.pool.clone(),
        Arc::new(DivisionCatalog::new(divisions())),
        normalizer_for(config.name_format),
        Arc::new(AuditLog::new(audit_path)),
        config,
    )
}
