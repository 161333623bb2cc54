//! Unresolved results list
//!
//! Results that exhausted every resolver tier (or were ambiguous) are recorded
//! here with a reason. Later runs skip them unless asked to retry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::error::{SyncError, SyncResult};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedEntry {
    pub result_id: i64,
    pub meet_id: i64,
    pub competitor_name: String,
    pub reason: String,
    pub first_attempt_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub attempts: u32,
}

pub async fn contains(pool: &SqlitePool, result_id: i64) -> SyncResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM unresolved_results WHERE result_id = ?")
        .bind(result_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}

/// Record a failed resolution; repeated failures bump `attempts`
pub async fn record(
    pool: &SqlitePool,
    result_id: i64,
    meet_id: i64,
    competitor_name: &str,
    reason: &str,
) -> SyncResult<()> {
    let now = Utc::now().to_rfc3339();

    retry_on_lock("unresolved_record", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO unresolved_results (
                result_id, meet_id, competitor_name, reason,
                first_attempt_at, last_attempt_at, attempts
            ) VALUES (?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT(result_id) DO UPDATE SET
                reason = excluded.reason,
                last_attempt_at = excluded.last_attempt_at,
                attempts = unresolved_results.attempts + 1
            "#,
        )
        .bind(result_id)
        .bind(meet_id)
        .bind(competitor_name)
        .bind(reason)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

/// Drop a result from the list once it has been resolved
pub async fn remove(pool: &SqlitePool, result_id: i64) -> SyncResult<()> {
    sqlx::query("DELETE FROM unresolved_results WHERE result_id = ?")
        .bind(result_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn list(pool: &SqlitePool) -> SyncResult<Vec<UnresolvedEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT result_id, meet_id, competitor_name, reason,
               first_attempt_at, last_attempt_at, attempts
        FROM unresolved_results
        ORDER BY result_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let first: String = row.try_get("first_attempt_at")?;
            let last: String = row.try_get("last_attempt_at")?;
            let attempts: i64 = row.try_get("attempts")?;
            Ok(UnresolvedEntry {
                result_id: row.try_get("result_id")?,
                meet_id: row.try_get("meet_id")?,
                competitor_name: row.try_get("competitor_name")?,
                reason: row.try_get("reason")?,
                first_attempt_at: parse_timestamp(&first)?,
                last_attempt_at: parse_timestamp(&last)?,
                attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            })
        })
        .collect()
}

fn parse_timestamp(value: &str) -> SyncResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::PersistenceFailure(format!("Failed to parse timestamp: {}", e)))
}
