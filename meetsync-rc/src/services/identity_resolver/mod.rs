//! Tiered identity resolver
//!
//! Resolves a local result to one remote candidate and backfills empty fields.
//!
//! **Routing:**
//! - Several local identities share the normalized name → tier D (history check) picks
//!   the identity, then tier A runs restricted to it. Tiers B and C are not
//!   tried because they cannot tell the identities apart.
//! - Otherwise A → B → C, first success wins.
//!
//! Results that exhaust every tier, or stay ambiguous, go to the unresolved
//! list and are skipped by later runs unless `retry_unresolved` is set.

mod field_fill;
mod history_match;
pub mod range_splitter;

pub use field_fill::{build_patch, identity_patch};
pub use history_match::history_contains_meet;
pub use range_splitter::{search_with_splitting, SplitSettings};

use chrono::Utc;
use meetsync_common::DateWindow;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::ResolverConfig;
use crate::db::{unresolved, ResultStore};
use crate::error::{SyncError, SyncResult};
use crate::models::{
    CompetitorCandidate, CompetitorIdentity, MeetRecord, ResolverTier, ResultFilter, ResultPatch,
    ResultRecord,
};
use crate::services::audit_log::{AuditEntry, AuditLog};
use crate::services::division_catalog::DivisionCatalog;
use crate::services::name_normalizer::NameNormalizer;
use crate::source::{CandidateQuery, SourceAdapter};

/// What a resolution attempt found (nothing is written yet)
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionOutcome {
    pub result_id: i64,
    /// Tier that produced the match; None when every tier came up empty
    pub tier: Option<ResolverTier>,
    pub patch: ResultPatch,
    pub divisions_searched: Vec<String>,
    /// Widest window queried, in days
    pub search_span_days: i64,
    pub tiers_attempted: Vec<ResolverTier>,
}

/// What happened to one result
#[derive(Debug, Clone, PartialEq)]
pub enum ResultDisposition {
    Resolved {
        tier: ResolverTier,
        fields_filled: usize,
    },
    Unresolved {
        reason: String,
    },
    /// Already on the unresolved list
    SkippedUnresolved,
}

/// Per-meet resolver totals
#[derive(Debug, Default)]
pub struct MeetResolution {
    pub resolved: usize,
    pub unresolved: usize,
    pub skipped_unresolved: usize,
    pub fields_filled: usize,
    /// Results whose resolution raised an error
    pub errors: Vec<(i64, SyncError)>,
}

#[derive(Debug, Default)]
struct SearchTrace {
    divisions: Vec<String>,
    span_days: i64,
    tiers: Vec<ResolverTier>,
}

impl SearchTrace {
    fn searched(&mut self, division: &str, window: &DateWindow) {
        if !self.divisions.iter().any(|d| d == division) {
            self.divisions.push(division.to_string());
        }
        self.span_days = self.span_days.max(window.span_days());
    }
}

/// One resolver for every caller; tiers are switched by configuration
pub struct TieredResolver {
    store: Arc<dyn ResultStore>,
    source: Arc<dyn SourceAdapter>,
    pool: SqlitePool,
    catalog: Arc<DivisionCatalog>,
    normalizer: Arc<dyn NameNormalizer>,
    audit: Arc<AuditLog>,
    config: ResolverConfig,
    /// Local identities keyed by normalized name, loaded once per resolver
    identity_index: OnceCell<HashMap<String, Vec<CompetitorIdentity>>>,
}

impl TieredResolver {
    pub fn new(
        store: Arc<dyn ResultStore>,
        source: Arc<dyn SourceAdapter>,
        pool: SqlitePool,
        catalog: Arc<DivisionCatalog>,
        normalizer: Arc<dyn NameNormalizer>,
        audit: Arc<AuditLog>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            store,
            source,
            pool,
            catalog,
            normalizer,
            audit,
            config,
            identity_index: OnceCell::new(),
        }
    }

    /// Local identities whose name normalizes to the same form as `name`
    async fn identities_named(&self, name: &str) -> SyncResult<Vec<CompetitorIdentity>> {
        let index = self
            .identity_index
            .get_or_try_init(|| async {
                let mut index: HashMap<String, Vec<CompetitorIdentity>> = HashMap::new();
                for identity in self.store.list_competitors().await? {
                    let key = self.normalizer.normalize(&identity.name);
                    if !key.is_empty() {
                        index.entry(key).or_default().push(identity);
                    }
                }
                tracing::debug!(names = index.len(), "Identity index loaded");
                Ok::<_, SyncError>(index)
            })
            .await?;

        let key = self.normalizer.normalize(name);
        Ok(index.get(&key).cloned().unwrap_or_default())
    }

    fn split_settings(&self) -> SplitSettings {
        SplitSettings {
            threshold_days: i64::from(self.config.split_threshold_days),
            max_depth: self.config.max_split_depth,
        }
    }

    fn candidate_matches(
        &self,
        record: &ResultRecord,
        candidate: &CompetitorCandidate,
        window: &DateWindow,
        identity: Option<&CompetitorIdentity>,
        require_date: bool,
    ) -> bool {
        if !self
            .normalizer
            .matches(&candidate.name, &record.competitor_name)
        {
            return false;
        }
        match candidate.date {
            Some(date) if !window.contains(date) => return false,
            None if require_date => return false,
            _ => {}
        }
        match identity {
            Some(identity) => identity_compatible(identity, candidate),
            None => true,
        }
    }

    /// Search one division and window; accept exactly one matching candidate
    async fn search_division(
        &self,
        record: &ResultRecord,
        division: &str,
        window: DateWindow,
        identity: Option<&CompetitorIdentity>,
        require_date: bool,
        trace: &mut SearchTrace,
    ) -> SyncResult<Option<CompetitorCandidate>> {
        trace.searched(division, &window);

        let query = CandidateQuery::unfiltered(division, window);
        let is_target = |c: &CompetitorCandidate| {
            self.candidate_matches(record, c, &window, identity, require_date)
        };
        let candidates = search_with_splitting(
            self.source.as_ref(),
            &query,
            self.split_settings(),
            &is_target,
        )
        .await?;

        let matches: Vec<CompetitorCandidate> =
            candidates.into_iter().filter(|c| is_target(c)).collect();
        if matches.len() > 1 {
            tracing::debug!(
                result_id = record.id,
                division,
                window = %window,
                matches = matches.len(),
                "Several candidates share the name, no match in this search"
            );
        }
        Ok(unique_match(matches))
    }

    async fn tier_a(
        &self,
        record: &ResultRecord,
        meet: &MeetRecord,
        identity: Option<&CompetitorIdentity>,
        trace: &mut SearchTrace,
    ) -> SyncResult<Option<CompetitorCandidate>> {
        trace.tiers.push(ResolverTier::TierA);
        let window = DateWindow::around(meet.date, self.config.tier_a_window_days);
        self.search_division(record, &record.division, window, identity, false, trace)
            .await
    }

    async fn tier_b(
        &self,
        record: &ResultRecord,
        meet: &MeetRecord,
        trace: &mut SearchTrace,
    ) -> SyncResult<Option<CompetitorCandidate>> {
        let Some(remote_id) = meet.remote_id.as_deref() else {
            return Ok(None);
        };
        trace.tiers.push(ResolverTier::TierB);

        let recorded = self
            .source
            .get_recorded_date(remote_id, &record.competitor_name)
            .await?;
        let Some(date) = recorded.filter(|d| *d != meet.date) else {
            return Ok(None);
        };

        tracing::debug!(
            result_id = record.id,
            stored = %meet.date,
            recorded = %date,
            "Source records a different date, retrying exact division"
        );
        let window = DateWindow::around(date, self.config.tier_a_window_days);
        self.search_division(record, &record.division, window, None, false, trace)
            .await
    }

    async fn tier_c(
        &self,
        record: &ResultRecord,
        meet: &MeetRecord,
        trace: &mut SearchTrace,
    ) -> SyncResult<Option<CompetitorCandidate>> {
        trace.tiers.push(ResolverTier::TierC);
        let window = DateWindow::around(meet.date, self.config.tier_c_window_days);
        let divisions = self.catalog.broadened_order(
            &record.division,
            self.config.weight_proximity_kg,
            self.config.max_broadened_divisions,
        );

        for division in &divisions {
            if let Some(candidate) = self
                .search_division(record, division, window, None, true, trace)
                .await?
            {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Tier D: pick the identity whose history contains this meet
    async fn tier_d(
        &self,
        record: &ResultRecord,
        meet: &MeetRecord,
        identities: &[CompetitorIdentity],
        trace: &mut SearchTrace,
    ) -> SyncResult<CompetitorIdentity> {
        trace.tiers.push(ResolverTier::TierD);

        let mut confirmed = Vec::new();
        for identity in identities {
            let Some(remote_id) = identity.remote_competitor_id.as_deref() else {
                tracing::debug!(
                    competitor_id = identity.id,
                    "Identity has no remote id, history unavailable"
                );
                continue;
            };
            let history = self.source.get_competitor_history(remote_id).await?;
            if history_contains_meet(&history, meet, record.total, self.config.total_tolerance) {
                confirmed.push(identity.clone());
            }
        }

        match confirmed.len() {
            1 => Ok(confirmed.remove(0)),
            0 => Err(SyncError::AmbiguousIdentity(format!(
                "no history of {} identities named '{}' lists meet {}",
                identities.len(),
                record.competitor_name,
                meet.local_id
            ))),
            n => Err(SyncError::AmbiguousIdentity(format!(
                "{} identities named '{}' list meet {}",
                n, record.competitor_name, meet.local_id
            ))),
        }
    }

    /// Find the match for `record` without writing anything
    pub async fn resolve(
        &self,
        record: &ResultRecord,
        meet: &MeetRecord,
    ) -> SyncResult<ResolutionOutcome> {
        let mut trace = SearchTrace::default();
        let force = self.config.force;

        let identities = self.identities_named(&record.competitor_name).await?;

        let (tier, patch) = if identities.len() > 1 {
            let known = record
                .competitor_id
                .and_then(|id| identities.iter().find(|i| i.id == id))
                .cloned();
            let identity = match known {
                Some(identity) => identity,
                None if self.config.enable_tier_d => {
                    self.tier_d(record, meet, &identities, &mut trace).await?
                }
                None => {
                    return Err(SyncError::AmbiguousIdentity(format!(
                        "{} identities named '{}' and history check disabled",
                        identities.len(),
                        record.competitor_name
                    )));
                }
            };

            let mut patch = identity_patch(
                record,
                identity.id,
                identity.remote_competitor_id.as_deref(),
                force,
            );
            let mut working = record.clone();
            patch.apply_to(&mut working);

            if let Some(candidate) = self.tier_a(&working, meet, Some(&identity), &mut trace).await? {
                let fields = build_patch(&working, &candidate, ResolverTier::TierA, force);
                merge_patch(&mut patch, fields);
            }

            let tier = if trace.tiers.contains(&ResolverTier::TierD) {
                ResolverTier::TierD
            } else {
                ResolverTier::TierA
            };
            if patch.is_empty() && tier == ResolverTier::TierA {
                (None, patch)
            } else {
                patch.resolved_tier = Some(tier);
                (Some(tier), patch)
            }
        } else {
            let single = identities.first();
            match self.escalate(record, meet, &mut trace).await? {
                Some((tier, candidate)) => {
                    let mut patch = build_patch(record, &candidate, tier, force);
                    if let Some(identity) = single.filter(|i| identity_compatible(i, &candidate)) {
                        let link = identity_patch(record, identity.id, None, force);
                        merge_patch(&mut patch, link);
                        if !patch.is_empty() {
                            patch.resolved_tier = Some(tier);
                        }
                    }
                    (Some(tier), patch)
                }
                None => (None, ResultPatch::default()),
            }
        };

        Ok(ResolutionOutcome {
            result_id: record.id,
            tier,
            patch,
            divisions_searched: trace.divisions,
            search_span_days: trace.span_days,
            tiers_attempted: trace.tiers,
        })
    }

    /// Tiers A, B, C in order; first success wins
    async fn escalate(
        &self,
        record: &ResultRecord,
        meet: &MeetRecord,
        trace: &mut SearchTrace,
    ) -> SyncResult<Option<(ResolverTier, CompetitorCandidate)>> {
        if let Some(candidate) = self.tier_a(record, meet, None, trace).await? {
            return Ok(Some((ResolverTier::TierA, candidate)));
        }
        if self.config.enable_tier_b {
            if let Some(candidate) = self.tier_b(record, meet, trace).await? {
                return Ok(Some((ResolverTier::TierB, candidate)));
            }
        }
        if self.config.enable_tier_c {
            if let Some(candidate) = self.tier_c(record, meet, trace).await? {
                return Ok(Some((ResolverTier::TierC, candidate)));
            }
        }
        Ok(None)
    }

    /// Resolve one result and apply the outcome
    pub async fn resolve_result(
        &self,
        record: &ResultRecord,
        meet: &MeetRecord,
    ) -> SyncResult<ResultDisposition> {
        let listed = unresolved::contains(&self.pool, record.id).await?;
        if listed && !self.config.retry_unresolved {
            tracing::debug!(result_id = record.id, "On unresolved list, skipping");
            return Ok(ResultDisposition::SkippedUnresolved);
        }

        let outcome = match self.resolve(record, meet).await {
            Ok(outcome) => outcome,
            Err(SyncError::AmbiguousIdentity(reason)) => {
                return self.mark_unresolved(record, reason).await;
            }
            Err(e) => return Err(e),
        };

        let Some(tier) = outcome.tier else {
            let reason = format!(
                "no unique candidate (tiers {:?}, {} divisions, span {} days)",
                outcome.tiers_attempted,
                outcome.divisions_searched.len(),
                outcome.search_span_days
            );
            return self.mark_unresolved(record, reason).await;
        };

        let fields_filled = outcome.patch.changes.len();
        if fields_filled > 0 {
            // Audit first: a failed write leaves the result untouched
            self.audit.append(&audit_entries(&outcome, tier))?;
            self.store.update_result(record.id, &outcome.patch).await?;
        }
        if listed {
            unresolved::remove(&self.pool, record.id).await?;
        }

        tracing::info!(
            result_id = record.id,
            meet_id = meet.local_id,
            tier = tier.as_str(),
            fields_filled,
            divisions_searched = outcome.divisions_searched.len(),
            "Result resolved"
        );
        Ok(ResultDisposition::Resolved {
            tier,
            fields_filled,
        })
    }

    async fn mark_unresolved(
        &self,
        record: &ResultRecord,
        reason: String,
    ) -> SyncResult<ResultDisposition> {
        tracing::warn!(
            result_id = record.id,
            meet_id = record.meet_id,
            competitor = %record.competitor_name,
            reason = %reason,
            "Result unresolved"
        );
        unresolved::record(
            &self.pool,
            record.id,
            record.meet_id,
            &record.competitor_name,
            &reason,
        )
        .await?;
        Ok(ResultDisposition::Unresolved { reason })
    }

    /// Resolve every result of `meet` that needs backfill
    ///
    /// Errors on single results are collected, not propagated. A changed
    /// source format stops the meet since every further query would fail too.
    pub async fn resolve_meet(&self, meet: &MeetRecord) -> SyncResult<MeetResolution> {
        let filter = if self.config.force {
            ResultFilter::for_meet(meet.local_id)
        } else {
            ResultFilter::backfill_for_meet(meet.local_id)
        };
        let records = self.store.read_results(&filter).await?;

        let mut totals = MeetResolution::default();
        for record in &records {
            match self.resolve_result(record, meet).await {
                Ok(ResultDisposition::Resolved { fields_filled, .. }) => {
                    totals.resolved += 1;
                    totals.fields_filled += fields_filled;
                }
                Ok(ResultDisposition::Unresolved { .. }) => totals.unresolved += 1,
                Ok(ResultDisposition::SkippedUnresolved) => totals.skipped_unresolved += 1,
                Err(e) => {
                    let stop = matches!(e, SyncError::SourceFormatChanged(_));
                    tracing::error!(result_id = record.id, error = %e, "Resolution failed");
                    totals.errors.push((record.id, e));
                    if stop {
                        break;
                    }
                }
            }
        }
        Ok(totals)
    }
}

/// Remote id and birth year must agree wherever both sides know them
fn identity_compatible(identity: &CompetitorIdentity, candidate: &CompetitorCandidate) -> bool {
    let ids_agree = match (&identity.remote_competitor_id, &candidate.remote_competitor_id) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    };
    let years_agree = match (identity.birth_year, candidate.birth_year) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    };
    ids_agree && years_agree
}

/// One candidate, or several rows of the same remote competitor
fn unique_match(matches: Vec<CompetitorCandidate>) -> Option<CompetitorCandidate> {
    let first = matches.first()?;
    let same_competitor = first.remote_competitor_id.is_some()
        && matches
            .iter()
            .all(|c| c.remote_competitor_id == first.remote_competitor_id);
    if matches.len() == 1 || same_competitor {
        matches.into_iter().next()
    } else {
        None
    }
}

/// Fold `extra` into `patch`; fields already set in `patch` win
fn merge_patch(patch: &mut ResultPatch, extra: ResultPatch) {
    let mut taken = Vec::new();
    macro_rules! take {
        ($field:ident) => {
            if patch.$field.is_none() && extra.$field.is_some() {
                patch.$field = extra.$field;
                taken.push(stringify!($field));
            }
        };
    }
    take!(competitor_id);
    take!(remote_competitor_id);
    take!(birth_year);
    take!(age);
    take!(club);
    take!(region);
    take!(gender);

    patch.changes.extend(
        extra
            .changes
            .into_iter()
            .filter(|c| taken.contains(&c.field.as_str())),
    );
}

fn audit_entries(outcome: &ResolutionOutcome, tier: ResolverTier) -> Vec<AuditEntry> {
    let timestamp = Utc::now();
    outcome
        .patch
        .changes
        .iter()
        .map(|change| AuditEntry {
            timestamp,
            result_id: outcome.result_id,
            field: change.field.clone(),
            before: change.before.clone(),
            after: change.after.clone(),
            tier,
            divisions_searched: outcome.divisions_searched.clone(),
            search_span_days: outcome.search_span_days,
        })
        .collect()
}
