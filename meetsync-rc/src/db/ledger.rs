//! Completion ledger persistence
//!
//! One row per meet in `completeness_ledger`. Writes are upserts wrapped in
//! `retry_on_lock`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::{SyncError, SyncResult};
use crate::models::{CompletenessStatus, CompletenessVerdict};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

fn parse_timestamp(value: &str, column: &str) -> SyncResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::PersistenceFailure(format!("Failed to parse {}: {}", column, e)))
}

fn entry_from_row(row: &SqliteRow) -> SyncResult<CompletenessVerdict> {
    let status: String = row.try_get("status")?;
    let status = CompletenessStatus::parse(&status).ok_or_else(|| {
        SyncError::PersistenceFailure(format!("unrecognized ledger status '{}'", status))
    })?;

    let remote_count: i64 = row.try_get("remote_count")?;
    let local_count: i64 = row.try_get("local_count")?;
    let last_checked_at: String = row.try_get("last_checked_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;
    let error_log: String = row.try_get("error_log")?;

    Ok(CompletenessVerdict {
        meet_id: row.try_get("meet_id")?,
        remote_count: u32::try_from(remote_count).map_err(|_| {
            SyncError::PersistenceFailure(format!("remote_count {} out of range", remote_count))
        })?,
        local_count: u32::try_from(local_count).map_err(|_| {
            SyncError::PersistenceFailure(format!("local_count {} out of range", local_count))
        })?,
        is_complete: row.try_get("is_complete")?,
        discrepancy: row.try_get("discrepancy")?,
        status,
        last_checked_at: parse_timestamp(&last_checked_at, "last_checked_at")?,
        completed_at: completed_at
            .as_deref()
            .map(|s| parse_timestamp(s, "completed_at"))
            .transpose()?,
        error_log: serde_json::from_str(&error_log)?,
    })
}

/// Load the ledger entry for a meet
///
/// A row that cannot be decoded is reported as `PersistenceFailure`.
pub async fn load_entry(pool: &SqlitePool, meet_id: i64) -> SyncResult<Option<CompletenessVerdict>> {
    let row = sqlx::query(
        r#"
        SELECT meet_id, remote_count, local_count, is_complete, discrepancy,
               status, last_checked_at, completed_at, error_log
        FROM completeness_ledger
        WHERE meet_id = ?
        "#,
    )
    .bind(meet_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// Insert or replace the ledger entry for `entry.meet_id`
pub async fn upsert_entry(pool: &SqlitePool, entry: &CompletenessVerdict) -> SyncResult<()> {
    let status = entry.status.as_str();
    let last_checked_at = entry.last_checked_at.to_rfc3339();
    let completed_at = entry.completed_at.map(|dt| dt.to_rfc3339());
    let error_log = serde_json::to_string(&entry.error_log)?;

    retry_on_lock("ledger_upsert", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO completeness_ledger (
                meet_id, remote_count, local_count, is_complete, discrepancy,
                status, last_checked_at, completed_at, error_log
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(meet_id) DO UPDATE SET
                remote_count = excluded.remote_count,
                local_count = excluded.local_count,
                is_complete = excluded.is_complete,
                discrepancy = excluded.discrepancy,
                status = excluded.status,
                last_checked_at = excluded.last_checked_at,
                completed_at = excluded.completed_at,
                error_log = excluded.error_log
            "#,
        )
        .bind(entry.meet_id)
        .bind(i64::from(entry.remote_count))
        .bind(i64::from(entry.local_count))
        .bind(entry.is_complete)
        .bind(entry.discrepancy)
        .bind(status)
        .bind(&last_checked_at)
        .bind(&completed_at)
        .bind(&error_log)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

/// All ledger entries ordered by meet id
pub async fn list_entries(pool: &SqlitePool) -> SyncResult<Vec<CompletenessVerdict>> {
    let rows = sqlx::query(
        r#"
        SELECT meet_id, remote_count, local_count, is_complete, discrepancy,
               status, last_checked_at, completed_at, error_log
        FROM completeness_ledger
        ORDER BY meet_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(entry_from_row).collect()
}
