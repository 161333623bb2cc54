//! Timeout and retry for remote source calls
//!
//! Every adapter call is bounded by a timeout. `SourceUnavailable` failures
//! (including timeouts) are retried with exponential backoff up to
//! `max_attempts`; any other error returns immediately. Exhausting the
//! attempts fails the call rather than hanging.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::{Duration, Instant};

use super::{CandidateQuery, SourceAdapter};
use crate::error::{SyncError, SyncResult};
use crate::models::{CompetitorCandidate, HistoryEntry};

/// Backoff and timeout settings for one adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            call_timeout: Duration::from_secs(45),
        }
    }
}

/// Run `operation` under `policy`
///
/// **Algorithm:**
/// 1. Attempt operation under `call_timeout` (a timeout counts as `SourceUnavailable`)
/// 2. If successful, return result
/// 3. If retryable and attempts remain: log WARN, backoff, retry
/// 4. If retryable and attempts exhausted: log ERROR, return `SourceUnavailable`
/// 5. Any other error: return immediately (no retry)
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> SyncResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = SyncResult<T>>,
{
    let start_time = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    let mut backoff = policy.initial_backoff;

    loop {
        attempt += 1;

        let outcome = match tokio::time::timeout(policy.call_timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::SourceUnavailable(format!(
                "{} timed out after {} ms",
                operation_name,
                policy.call_timeout.as_millis()
            ))),
        };

        match outcome {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Source call succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        error = %err,
                        "Source call failed: retries exhausted"
                    );
                    return Err(SyncError::SourceUnavailable(format!(
                        "{} failed after {} attempts: {}",
                        operation_name, attempt, err
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Source call failed, will retry after backoff"
                );

                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
        }
    }
}

/// Adapter decorator applying a `RetryPolicy` to every call
pub struct RetryingSource<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A: SourceAdapter> RetryingSource<A> {
    pub fn new(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: SourceAdapter> SourceAdapter for RetryingSource<A> {
    async fn get_result_count(&self, remote_meet_id: &str) -> SyncResult<u32> {
        with_retry("get_result_count", &self.policy, || {
            self.inner.get_result_count(remote_meet_id)
        })
        .await
    }

    async fn search_candidates(
        &self,
        query: &CandidateQuery,
    ) -> SyncResult<Vec<CompetitorCandidate>> {
        with_retry("search_candidates", &self.policy, || {
            self.inner.search_candidates(query)
        })
        .await
    }

    async fn get_competitor_history(
        &self,
        remote_competitor_id: &str,
    ) -> SyncResult<Vec<HistoryEntry>> {
        with_retry("get_competitor_history", &self.policy, || {
            self.inner.get_competitor_history(remote_competitor_id)
        })
        .await
    }

    async fn get_recorded_date(
        &self,
        remote_meet_id: &str,
        competitor_name: &str,
    ) -> SyncResult<Option<NaiveDate>> {
        with_retry("get_recorded_date", &self.policy, || {
            self.inner.get_recorded_date(remote_meet_id, competitor_name)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            call_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = with_retry("test_op", &fast_policy(3), || async { Ok::<u32, SyncError>(42) })
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test_op", &fast_policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(SyncError::SourceUnavailable("flaky".into()))
                } else {
                    Ok(7u32)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_fails() {
        let calls = AtomicU32::new(0);
        let result: SyncResult<u32> = with_retry("test_op", &fast_policy(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::SourceUnavailable("down".into())) }
        })
        .await;

        assert!(matches!(result, Err(SyncError::SourceUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_format_change_not_retried() {
        let calls = AtomicU32::new(0);
        let result: SyncResult<u32> = with_retry("test_op", &fast_policy(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::SourceFormatChanged("missing table".into())) }
        })
        .await;

        assert!(matches!(result, Err(SyncError::SourceFormatChanged(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_unavailable() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            call_timeout: Duration::from_millis(10),
            ..fast_policy(2)
        };
        let result: SyncResult<u32> = with_retry("slow_op", &policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(1)
            }
        })
        .await;

        assert!(matches!(result, Err(SyncError::SourceUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
