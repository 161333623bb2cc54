//! HTTP client for the source gateway
//!
//! The gateway is the process that owns the remote source's UI session and
//! exposes it as JSON:
//! - `GET /meets/{id}/count` → `{"count": n}`
//! - `GET /candidates?division&start&end&name&page` → `{"candidates": [...], "next_page": n|null}`
//! - `GET /competitors/{id}/history` → `{"entries": [...]}`
//! - `GET /meets/{id}/recorded-date?name` → `{"date": "YYYY-MM-DD"|null}`
//!
//! Every request waits on a token-bucket rate limiter first.

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;

use super::{CandidateQuery, SourceAdapter};
use crate::config::SourceConfig;
use crate::error::{SyncError, SyncResult};
use crate::models::{dedup_candidates, CompetitorCandidate, HistoryEntry};

/// Upper bound on pages followed for one search
const MAX_PAGES: u32 = 500;

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u32,
}

#[derive(Debug, Deserialize)]
struct CandidatePage {
    candidates: Vec<CompetitorCandidate>,
    #[serde(default)]
    next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    entries: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
struct RecordedDateResponse {
    date: Option<NaiveDate>,
}

/// Source adapter speaking JSON to the source gateway
pub struct HttpSourceAdapter {
    client: Client,
    base_url: String,
    user_agent: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl HttpSourceAdapter {
    pub fn new(config: &SourceConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| SyncError::ValidationError(format!("HTTP client build failed: {}", e)))?;

        let per_second = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            SyncError::ValidationError("requests_per_second must be greater than zero".into())
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET `path` with `query`, decode JSON body
    ///
    /// Returns `Ok(None)` on 404 so callers decide what absence means.
    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> SyncResult<Option<T>> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(operation, url = %url, "Querying source gateway");

        let response = self
            .client
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(operation, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
        {
            return Err(SyncError::SourceUnavailable(format!(
                "{} returned {}",
                operation, status
            )));
        }
        if !status.is_success() {
            return Err(SyncError::SourceFormatChanged(format!(
                "{} returned unexpected status {}",
                operation, status
            )));
        }

        let body = response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                SyncError::SourceFormatChanged(format!("{} response malformed: {}", operation, e))
            } else {
                transport_error(operation, e)
            }
        })?;
        Ok(Some(body))
    }
}

fn transport_error(operation: &str, err: reqwest::Error) -> SyncError {
    if err.is_decode() {
        SyncError::SourceFormatChanged(format!("{}: {}", operation, err))
    } else {
        SyncError::SourceUnavailable(format!("{}: {}", operation, err))
    }
}

#[async_trait]
impl SourceAdapter for HttpSourceAdapter {
    async fn get_result_count(&self, remote_meet_id: &str) -> SyncResult<u32> {
        let path = format!("/meets/{}/count", remote_meet_id);
        let response: Option<CountResponse> =
            self.get_json("get_result_count", &path, &[]).await?;

        response.map(|r| r.count).ok_or_else(|| {
            SyncError::SourceFormatChanged(format!("meet {} not listed by source", remote_meet_id))
        })
    }

    async fn search_candidates(
        &self,
        query: &CandidateQuery,
    ) -> SyncResult<Vec<CompetitorCandidate>> {
        let mut params = vec![
            ("division", query.division.clone()),
            ("start", query.window.start.to_string()),
            ("end", query.window.end.to_string()),
        ];
        if let Some(name) = &query.name_filter {
            params.push(("name", name.clone()));
        }

        let mut collected = Vec::new();
        let mut page = 1u32;
        loop {
            let mut page_params = params.clone();
            page_params.push(("page", page.to_string()));

            let response: Option<CandidatePage> = self
                .get_json("search_candidates", "/candidates", &page_params)
                .await?;
            let Some(response) = response else {
                return Err(SyncError::SourceFormatChanged(
                    "candidate search endpoint missing".to_string(),
                ));
            };

            collected.extend(response.candidates);

            match response.next_page {
                Some(next) if next > page && next <= MAX_PAGES => page = next,
                Some(next) if next <= page => {
                    return Err(SyncError::SourceFormatChanged(format!(
                        "pagination did not advance (page {} → {})",
                        page, next
                    )));
                }
                Some(_) => {
                    return Err(SyncError::SourceFormatChanged(format!(
                        "pagination exceeded {} pages",
                        MAX_PAGES
                    )));
                }
                None => break,
            }
        }

        let total = collected.len();
        let unique = dedup_candidates(collected);
        tracing::debug!(
            division = %query.division,
            window = %query.window,
            returned = total,
            unique = unique.len(),
            "Candidate search finished"
        );
        Ok(unique)
    }

    async fn get_competitor_history(
        &self,
        remote_competitor_id: &str,
    ) -> SyncResult<Vec<HistoryEntry>> {
        let path = format!("/competitors/{}/history", remote_competitor_id);
        let response: Option<HistoryResponse> =
            self.get_json("get_competitor_history", &path, &[]).await?;

        response.map(|r| r.entries).ok_or_else(|| {
            SyncError::SourceFormatChanged(format!(
                "competitor {} not listed by source",
                remote_competitor_id
            ))
        })
    }

    async fn get_recorded_date(
        &self,
        remote_meet_id: &str,
        competitor_name: &str,
    ) -> SyncResult<Option<NaiveDate>> {
        let path = format!("/meets/{}/recorded-date", remote_meet_id);
        let response: Option<RecordedDateResponse> = self
            .get_json(
                "get_recorded_date",
                &path,
                &[("name", competitor_name.to_string())],
            )
            .await?;

        Ok(response.and_then(|r| r.date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_trims_base_url() {
        let config = SourceConfig {
            base_url: "http://gateway.local:8711/".to_string(),
            ..SourceConfig::default()
        };
        let adapter = HttpSourceAdapter::new(&config).unwrap();
        assert_eq!(adapter.base_url(), "http://gateway.local:8711");
    }

    #[test]
    fn test_zero_rate_rejected() {
        let config = SourceConfig {
            requests_per_second: 0,
            ..SourceConfig::default()
        };
        assert!(matches!(
            HttpSourceAdapter::new(&config),
            Err(SyncError::ValidationError(_))
        ));
    }

    #[test]
    fn test_candidate_page_decodes_without_next_page() {
        let page: CandidatePage = serde_json::from_str(
            r#"{"candidates":[{"name":"Jane Roe","division":"F-OPEN-63","date":"2024-03-02","total":310.0}]}"#,
        )
        .unwrap();
        assert_eq!(page.candidates.len(), 1);
        assert!(page.next_page.is_none());
        assert_eq!(page.candidates[0].total, Some(310.0));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_unavailable() {
        let config = SourceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            connect_timeout_ms: 200,
            request_timeout_ms: 500,
            ..SourceConfig::default()
        };
        let adapter = HttpSourceAdapter::new(&config).unwrap();
        let result = adapter.get_result_count("m-1").await;
        assert!(matches!(result, Err(SyncError::SourceUnavailable(_))));
    }
}
