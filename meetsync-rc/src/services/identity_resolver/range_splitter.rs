//! Adaptive range splitting
//!
//! The source returns nothing, rather than an error, when an unfiltered query
//! over a long span overloads it. An empty unfiltered result over more than
//! `threshold_days` is therefore not trusted: the window is bisected and the
//! halves are searched, earlier half first. Once the target is found in the
//! earlier half the later half is not queried. Recursion stops at `max_depth`.

use std::future::Future;
use std::pin::Pin;

use crate::error::SyncResult;
use crate::models::{dedup_candidates, CompetitorCandidate};
use crate::source::{CandidateQuery, SourceAdapter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSettings {
    pub threshold_days: i64,
    pub max_depth: u32,
}

/// Predicate identifying the candidate being looked for
pub type TargetFn<'a> = &'a (dyn Fn(&CompetitorCandidate) -> bool + Send + Sync);

/// Search `query`, splitting empty long-span results
pub async fn search_with_splitting(
    source: &dyn SourceAdapter,
    query: &CandidateQuery,
    settings: SplitSettings,
    is_target: TargetFn<'_>,
) -> SyncResult<Vec<CompetitorCandidate>> {
    search_range(source, query.clone(), settings, is_target, 0).await
}

fn search_range<'a>(
    source: &'a dyn SourceAdapter,
    query: CandidateQuery,
    settings: SplitSettings,
    is_target: TargetFn<'a>,
    depth: u32,
) -> Pin<Box<dyn Future<Output = SyncResult<Vec<CompetitorCandidate>>> + Send + 'a>> {
    Box::pin(async move {
        let results = source.search_candidates(&query).await?;

        let trusted = !results.is_empty()
            || query.name_filter.is_some()
            || query.window.span_days() <= settings.threshold_days
            || depth >= settings.max_depth;
        if trusted {
            return Ok(results);
        }

        let Some((earlier, later)) = query.window.split() else {
            return Ok(results);
        };

        tracing::warn!(
            division = %query.division,
            window = %query.window,
            span_days = query.window.span_days(),
            depth,
            "Empty unfiltered result over long span, splitting range"
        );

        let left = search_range(
            source,
            query.with_window(earlier),
            settings,
            is_target,
            depth + 1,
        )
        .await?;
        if left.iter().any(|c| is_target(c)) {
            return Ok(left);
        }

        let right = search_range(
            source,
            query.with_window(later),
            settings,
            is_target,
            depth + 1,
        )
        .await?;

        let mut merged = left;
        merged.extend(right);
        Ok(dedup_candidates(merged))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HistoryEntry;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate};
    use meetsync_common::DateWindow;
    use std::sync::Mutex;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn candidate(remote_id: &str, date: Option<NaiveDate>) -> CompetitorCandidate {
        CompetitorCandidate {
            name: "Max Power".into(),
            age: None,
            birth_year: None,
            club: None,
            region: None,
            gender: None,
            date,
            division: "M-OPEN-93".into(),
            total: None,
            remote_competitor_id: Some(remote_id.into()),
            meet_name: None,
        }
    }

    /// Returns nothing for unfiltered windows longer than `blackout_days`
    struct OverloadedSource {
        candidates: Vec<CompetitorCandidate>,
        blackout_days: i64,
        windows: Mutex<Vec<DateWindow>>,
    }

    impl OverloadedSource {
        fn new(candidates: Vec<CompetitorCandidate>, blackout_days: i64) -> Self {
            Self {
                candidates,
                blackout_days,
                windows: Mutex::new(Vec::new()),
            }
        }

        fn windows(&self) -> Vec<DateWindow> {
            self.windows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SourceAdapter for OverloadedSource {
        async fn get_result_count(&self, _remote_meet_id: &str) -> SyncResult<u32> {
            Ok(0)
        }

        async fn search_candidates(
            &self,
            query: &CandidateQuery,
        ) -> SyncResult<Vec<CompetitorCandidate>> {
            self.windows.lock().unwrap().push(query.window);
            if query.name_filter.is_none() && query.window.span_days() > self.blackout_days {
                return Ok(Vec::new());
            }
            Ok(self
                .candidates
                .iter()
                .filter(|c| c.division == query.division)
                .filter(|c| c.date.map_or(true, |d| query.window.contains(d)))
                .cloned()
                .collect())
        }

        async fn get_competitor_history(
            &self,
            _remote_competitor_id: &str,
        ) -> SyncResult<Vec<HistoryEntry>> {
            Ok(Vec::new())
        }

        async fn get_recorded_date(
            &self,
            _remote_meet_id: &str,
            _competitor_name: &str,
        ) -> SyncResult<Option<NaiveDate>> {
            Ok(None)
        }
    }

    fn is_t1(c: &CompetitorCandidate) -> bool {
        c.remote_competitor_id.as_deref() == Some("t1")
    }

    #[tokio::test]
    async fn test_empty_source_bounded_by_max_depth() {
        let source = OverloadedSource::new(Vec::new(), 0);
        let settings = SplitSettings {
            threshold_days: 365,
            max_depth: 3,
        };
        let start = date(2014, 1, 1);
        let window = DateWindow::new(start, start + Duration::days(4000)).unwrap();
        let query = CandidateQuery::unfiltered("M-OPEN-93", window);

        let found = search_with_splitting(&source, &query, settings, &is_t1)
            .await
            .unwrap();

        assert!(found.is_empty());
        // Full binary tree of depth 3
        let max_calls = (1usize << (settings.max_depth + 1)) - 1;
        assert_eq!(source.windows().len(), max_calls);
    }

    #[tokio::test]
    async fn test_later_half_searched_and_merged() {
        let center = date(2024, 1, 1);
        let source = OverloadedSource::new(
            vec![
                candidate("u1", None),
                candidate("t1", Some(center + Duration::days(100))),
            ],
            365,
        );
        let settings = SplitSettings {
            threshold_days: 365,
            max_depth: 4,
        };
        let query = CandidateQuery::unfiltered("M-OPEN-93", DateWindow::around(center, 300));

        let found = search_with_splitting(&source, &query, settings, &is_t1)
            .await
            .unwrap();

        let windows = source.windows();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[1].end, center);
        assert_eq!(windows[2].start, center + Duration::days(1));

        assert_eq!(found.len(), 2);
        assert_eq!(
            found
                .iter()
                .filter(|c| c.remote_competitor_id.as_deref() == Some("u1"))
                .count(),
            1
        );
        assert!(found.iter().any(is_t1));
    }

    #[tokio::test]
    async fn test_earlier_half_hit_skips_later_half() {
        let center = date(2024, 1, 1);
        let source = OverloadedSource::new(
            vec![candidate("t1", Some(center - Duration::days(50)))],
            365,
        );
        let settings = SplitSettings {
            threshold_days: 365,
            max_depth: 4,
        };
        let query = CandidateQuery::unfiltered("M-OPEN-93", DateWindow::around(center, 300));

        let found = search_with_splitting(&source, &query, settings, &is_t1)
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(source.windows().len(), 2);
    }

    #[tokio::test]
    async fn test_name_filtered_empty_result_trusted() {
        let source = OverloadedSource::new(Vec::new(), 0);
        let settings = SplitSettings {
            threshold_days: 365,
            max_depth: 4,
        };
        let mut query = CandidateQuery::unfiltered(
            "M-OPEN-93",
            DateWindow::around(date(2024, 1, 1), 2000),
        );
        query.name_filter = Some("Max Power".into());

        let found = search_with_splitting(&source, &query, settings, &is_t1)
            .await
            .unwrap();

        assert!(found.is_empty());
        assert_eq!(source.windows().len(), 1);
    }
}
