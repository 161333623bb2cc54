//! Tiered identity resolver scenarios against a scripted source

mod helpers;

use chrono::Duration;
use std::sync::Arc;
use tempfile::TempDir;

use helpers::{
    bare_result, build_resolver, candidate, date, identity, meet, Call, FakeSource, TestStore,
};
use meetsync_rc::config::ResolverConfig;
use meetsync_rc::db::{unresolved, ResultStore};
use meetsync_rc::models::{HistoryEntry, MeetRecord, ResolverTier};
use meetsync_rc::services::{AuditLog, ResultDisposition, TieredResolver};

struct Fixture {
    test: TestStore,
    source: Arc<FakeSource>,
    meet: MeetRecord,
    dir: TempDir,
}

impl Fixture {
    async fn new() -> Self {
        let test = TestStore::new().await;
        let meet = meet(1, Some("r-1"), "Spring Open", date(2024, 3, 2));
        test.add_meet(&meet).await;
        Self {
            test,
            source: Arc::new(FakeSource::new()),
            meet,
            dir: tempfile::tempdir().expect("temp dir"),
        }
    }

    fn audit_path(&self) -> std::path::PathBuf {
        self.dir.path().join("audit.jsonl")
    }

    fn resolver(&self, config: ResolverConfig) -> TieredResolver {
        build_resolver(&self.test, self.source.clone(), config, &self.audit_path())
    }
}

#[tokio::test]
async fn test_tier_a_fills_only_empty_fields() {
    let fx = Fixture::new().await;
    let mut record = bare_result(10, 1, "John Doe", "M-OPEN-93");
    record.club = Some("Local Club".to_string());
    fx.test.add_result(&record).await;
    fx.source
        .add_candidate(candidate("John Doe", "M-OPEN-93", date(2024, 3, 2)));

    let resolver = fx.resolver(ResolverConfig::default());
    let outcome = resolver.resolve(&record, &fx.meet).await.unwrap();
    assert_eq!(outcome.tier, Some(ResolverTier::TierA));
    assert_eq!(outcome.tiers_attempted, vec![ResolverTier::TierA]);
    assert_eq!(outcome.divisions_searched, vec!["M-OPEN-93".to_string()]);

    let disposition = resolver.resolve_result(&record, &fx.meet).await.unwrap();
    assert_eq!(
        disposition,
        ResultDisposition::Resolved {
            tier: ResolverTier::TierA,
            fields_filled: 4,
        }
    );

    let stored = fx.test.store.read_result(10).await.unwrap().unwrap();
    assert_eq!(stored.club.as_deref(), Some("Local Club"));
    assert_eq!(stored.birth_year, Some(1994));
    assert_eq!(stored.region.as_deref(), Some("North"));
    assert_eq!(stored.resolved_tier, Some(ResolverTier::TierA));

    let audit = AuditLog::new(fx.audit_path()).read_all().unwrap();
    assert_eq!(audit.len(), 4);
    assert!(audit.iter().all(|e| e.result_id == 10 && e.tier == ResolverTier::TierA));
    assert!(!audit.iter().any(|e| e.field == "club"));
}

#[tokio::test]
async fn test_audit_failure_leaves_result_unchanged() {
    let fx = Fixture::new().await;
    let record = bare_result(12, 1, "John Doe", "M-OPEN-93");
    fx.test.add_result(&record).await;
    fx.source
        .add_candidate(candidate("John Doe", "M-OPEN-93", date(2024, 3, 2)));

    // A directory where the audit file should be cannot be appended to
    let blocked = fx.dir.path().join("blocked");
    std::fs::create_dir_all(&blocked).unwrap();
    let resolver = build_resolver(&fx.test, fx.source.clone(), ResolverConfig::default(), &blocked);

    assert!(resolver.resolve_result(&record, &fx.meet).await.is_err());
    let stored = fx.test.store.read_result(12).await.unwrap().unwrap();
    assert_eq!(stored, record);
}

#[tokio::test]
async fn test_surname_first_name_matches() {
    let fx = Fixture::new().await;
    let record = bare_result(11, 1, "SMITH Anna", "F-OPEN-84");
    fx.test.add_result(&record).await;
    fx.source
        .add_candidate(candidate("Anna Smith", "F-OPEN-84", date(2024, 3, 3)));

    let outcome = fx
        .resolver(ResolverConfig::default())
        .resolve(&record, &fx.meet)
        .await
        .unwrap();
    assert_eq!(outcome.tier, Some(ResolverTier::TierA));
}

#[tokio::test]
async fn test_tier_b_uses_recorded_date() {
    let fx = Fixture::new().await;
    let record = bare_result(12, 1, "Jane Roe", "M-OPEN-93");
    fx.test.add_result(&record).await;
    fx.source
        .add_candidate(candidate("Jane Roe", "M-OPEN-93", date(2024, 4, 20)));
    fx.source
        .set_recorded_date("r-1", "Jane Roe", date(2024, 4, 20));

    let outcome = fx
        .resolver(ResolverConfig::default())
        .resolve(&record, &fx.meet)
        .await
        .unwrap();
    assert_eq!(outcome.tier, Some(ResolverTier::TierB));
    assert_eq!(
        outcome.tiers_attempted,
        vec![ResolverTier::TierA, ResolverTier::TierB]
    );
    assert_eq!(outcome.patch.resolved_tier, Some(ResolverTier::TierB));
}

#[tokio::test]
async fn test_tier_c_finds_neighbouring_division() {
    let fx = Fixture::new().await;
    let record = bare_result(13, 1, "Carl Heavy", "M-OPEN-93");
    fx.test.add_result(&record).await;
    fx.source
        .add_candidate(candidate("Carl Heavy", "M-OPEN-105", date(2024, 5, 1)));

    let outcome = fx
        .resolver(ResolverConfig::default())
        .resolve(&record, &fx.meet)
        .await
        .unwrap();
    assert_eq!(outcome.tier, Some(ResolverTier::TierC));
    assert_eq!(
        outcome.tiers_attempted,
        vec![ResolverTier::TierA, ResolverTier::TierB, ResolverTier::TierC]
    );
    assert_eq!(
        outcome.divisions_searched,
        vec!["M-OPEN-93".to_string(), "M-OPEN-105".to_string()]
    );
    assert_eq!(outcome.search_span_days, 600);
}

#[tokio::test]
async fn test_duplicate_names_resolved_by_history() {
    let fx = Fixture::new().await;
    let mut first = identity(1, "John Smith", Some("c1"));
    first.birth_year = Some(1994);
    let second = identity(2, "John Smith", Some("c2"));
    fx.test.add_identity(&first).await;
    fx.test.add_identity(&second).await;

    let mut record = bare_result(20, 1, "John Smith", "M-OPEN-93");
    record.total = Some(600.0);
    fx.test.add_result(&record).await;

    let other_meet = meet(2, Some("r-2"), "Autumn Classic", date(2023, 10, 14));
    fx.test.add_meet(&other_meet).await;
    let mut others = bare_result(21, 2, "John Smith", "M-OPEN-93");
    others.competitor_id = Some(2);
    fx.test.add_result(&others).await;

    fx.source.set_history(
        "c1",
        vec![HistoryEntry {
            meet_name: "Spring Open".to_string(),
            date: date(2024, 3, 2),
            division: Some("M-OPEN-93".to_string()),
            total: Some(600.0),
        }],
    );
    fx.source.set_history(
        "c2",
        vec![HistoryEntry {
            meet_name: "Autumn Classic".to_string(),
            date: date(2023, 10, 14),
            division: None,
            total: None,
        }],
    );
    let mut ours = candidate("John Smith", "M-OPEN-93", date(2024, 3, 2));
    ours.remote_competitor_id = Some("c1".to_string());
    let mut theirs = candidate("John Smith", "M-OPEN-93", date(2024, 3, 2));
    theirs.remote_competitor_id = Some("c2".to_string());
    theirs.club = Some("Other Club".to_string());
    fx.source.add_candidate(ours);
    fx.source.add_candidate(theirs);

    let resolver = fx.resolver(ResolverConfig::default());
    let disposition = resolver.resolve_result(&record, &fx.meet).await.unwrap();
    assert!(matches!(
        disposition,
        ResultDisposition::Resolved {
            tier: ResolverTier::TierD,
            ..
        }
    ));

    let resolved = fx.test.store.read_result(20).await.unwrap().unwrap();
    assert_eq!(resolved.competitor_id, Some(1));
    assert_eq!(resolved.remote_competitor_id.as_deref(), Some("c1"));
    assert_eq!(resolved.club.as_deref(), Some("Iron Club"));
    assert_eq!(resolved.resolved_tier, Some(ResolverTier::TierD));

    let untouched = fx.test.store.read_result(21).await.unwrap().unwrap();
    assert_eq!(untouched, others);
}

#[tokio::test]
async fn test_surname_first_duplicate_routes_through_history() {
    let fx = Fixture::new().await;
    fx.test.add_identity(&identity(1, "John Smith", Some("c1"))).await;
    fx.test.add_identity(&identity(2, "John Smith", Some("c2"))).await;
    let record = bare_result(22, 1, "SMITH John", "M-OPEN-93");
    fx.test.add_result(&record).await;

    fx.source.set_history("c1", vec![]);
    fx.source.set_history(
        "c2",
        vec![HistoryEntry {
            meet_name: "Spring Open".to_string(),
            date: date(2024, 3, 2),
            division: None,
            total: None,
        }],
    );
    // Only the other identity shows up in the exact window
    let mut other = candidate("John Smith", "M-OPEN-93", date(2024, 3, 2));
    other.remote_competitor_id = Some("c1".to_string());
    fx.source.add_candidate(other);

    let resolver = fx.resolver(ResolverConfig::default());
    let outcome = resolver.resolve(&record, &fx.meet).await.unwrap();
    assert!(outcome.tiers_attempted.contains(&ResolverTier::TierD));
    assert!(!outcome.tiers_attempted.contains(&ResolverTier::TierC));
    assert_eq!(outcome.tier, Some(ResolverTier::TierD));

    resolver.resolve_result(&record, &fx.meet).await.unwrap();
    let stored = fx.test.store.read_result(22).await.unwrap().unwrap();
    assert_eq!(stored.competitor_id, Some(2));
    assert_eq!(stored.remote_competitor_id.as_deref(), Some("c2"));
    assert!(stored.club.is_none());
    assert!(stored.birth_year.is_none());
}

#[tokio::test]
async fn test_ambiguous_history_goes_to_unresolved_list() {
    let fx = Fixture::new().await;
    fx.test.add_identity(&identity(1, "John Smith", Some("c1"))).await;
    fx.test.add_identity(&identity(2, "John Smith", Some("c2"))).await;
    let record = bare_result(30, 1, "John Smith", "M-OPEN-93");
    fx.test.add_result(&record).await;

    let spring = HistoryEntry {
        meet_name: "Spring Open".to_string(),
        date: date(2024, 3, 2),
        division: None,
        total: None,
    };
    fx.source.set_history("c1", vec![spring.clone()]);
    fx.source.set_history("c2", vec![spring]);

    let resolver = fx.resolver(ResolverConfig::default());
    let first = resolver.resolve_result(&record, &fx.meet).await.unwrap();
    assert!(matches!(first, ResultDisposition::Unresolved { .. }));
    assert!(unresolved::contains(&fx.test.pool, 30).await.unwrap());
    assert!(fx.test.store.read_result(30).await.unwrap().unwrap().competitor_id.is_none());

    fx.source.clear_calls();
    let second = resolver.resolve_result(&record, &fx.meet).await.unwrap();
    assert_eq!(second, ResultDisposition::SkippedUnresolved);
    assert!(fx.source.calls().is_empty());

    let retrying = fx.resolver(ResolverConfig {
        retry_unresolved: true,
        ..Default::default()
    });
    let third = retrying.resolve_result(&record, &fx.meet).await.unwrap();
    assert!(matches!(third, ResultDisposition::Unresolved { .. }));
    assert!(fx.source.calls().contains(&Call::History("c1".to_string())));

    let listed = unresolved::list(&fx.test.pool).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].attempts, 2);
}

#[tokio::test]
async fn test_retry_clears_unresolved_entry_once_found() {
    let fx = Fixture::new().await;
    let record = bare_result(31, 1, "Late Entry", "M-OPEN-93");
    fx.test.add_result(&record).await;

    let resolver = fx.resolver(ResolverConfig {
        retry_unresolved: true,
        ..Default::default()
    });
    let first = resolver.resolve_result(&record, &fx.meet).await.unwrap();
    assert!(matches!(first, ResultDisposition::Unresolved { .. }));

    fx.source
        .add_candidate(candidate("Late Entry", "M-OPEN-93", date(2024, 3, 2)));
    let second = resolver.resolve_result(&record, &fx.meet).await.unwrap();
    assert!(matches!(second, ResultDisposition::Resolved { .. }));
    assert!(!unresolved::contains(&fx.test.pool, 31).await.unwrap());
}

#[tokio::test]
async fn test_long_empty_range_split_finds_earlier_half() {
    let fx = Fixture::new().await;
    let record = bare_result(40, 1, "Max Power", "M-OPEN-93");
    fx.test.add_result(&record).await;
    fx.source.set_blackout_days(365);
    fx.source.add_candidate(candidate(
        "Max Power",
        "M-OPEN-93",
        fx.meet.date - Duration::days(100),
    ));

    let outcome = fx
        .resolver(ResolverConfig {
            enable_tier_b: false,
            ..Default::default()
        })
        .resolve(&record, &fx.meet)
        .await
        .unwrap();

    assert_eq!(outcome.tier, Some(ResolverTier::TierC));
    assert_eq!(
        outcome.tiers_attempted,
        vec![ResolverTier::TierA, ResolverTier::TierC]
    );

    let windows = fx.source.search_windows();
    // Tier A window, then the blacked-out full range, then the earlier half
    assert_eq!(windows.len(), 3);
    assert_eq!(windows[1].span_days(), 600);
    assert_eq!(windows[2].end, fx.meet.date);
    let later_start = fx.meet.date + Duration::days(1);
    assert!(!windows.iter().any(|w| w.start == later_start));
}

#[tokio::test]
async fn test_resolve_meet_counts_dispositions() {
    let fx = Fixture::new().await;
    fx.test
        .add_result(&bare_result(50, 1, "Found Lifter", "M-OPEN-93"))
        .await;
    fx.test
        .add_result(&bare_result(51, 1, "Missing Lifter", "M-OPEN-93"))
        .await;
    fx.source
        .add_candidate(candidate("Found Lifter", "M-OPEN-93", date(2024, 3, 2)));

    let resolver = fx.resolver(ResolverConfig::default());
    let totals = resolver.resolve_meet(&fx.meet).await.unwrap();
    assert_eq!(totals.resolved, 1);
    assert_eq!(totals.unresolved, 1);
    assert_eq!(totals.fields_filled, 5);
    assert!(totals.errors.is_empty());

    // No identity to link, so result 50 is revisited but nothing is rewritten
    let again = resolver.resolve_meet(&fx.meet).await.unwrap();
    assert_eq!(again.resolved, 1);
    assert_eq!(again.fields_filled, 0);
    assert_eq!(again.skipped_unresolved, 1);
    let audit = AuditLog::new(fx.audit_path()).read_all().unwrap();
    assert_eq!(audit.len(), 5);
}
