//! Sync session database operations

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::models::{ItemLogEntry, SessionCounters, SessionError, SessionState, SyncSession};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Save sync session to database
///
/// Uses retry_on_lock to ride out transient write-lock contention.
pub async fn save_session(pool: &SqlitePool, session: &SyncSession) -> SyncResult<()> {
    // Serialize before touching the database
    let session_id = session.session_id.to_string();
    let state = serde_json::to_string(&session.state)?;
    let counters = serde_json::to_string(&session.counters)?;
    let item_log = serde_json::to_string(&session.item_log)?;
    let errors = serde_json::to_string(&session.errors)?;
    let started_at = session.started_at.to_rfc3339();
    let ended_at = session.ended_at.map(|dt| dt.to_rfc3339());

    retry_on_lock("save_session", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO sync_sessions (
                session_id, state, counters, item_log, errors, started_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                state = excluded.state,
                counters = excluded.counters,
                item_log = excluded.item_log,
                errors = excluded.errors,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(&session_id)
        .bind(&state)
        .bind(&counters)
        .bind(&item_log)
        .bind(&errors)
        .bind(&started_at)
        .bind(&ended_at)
        .execute(pool)
        .await?;

        Ok(())
    })
    .await
}

/// Load sync session from database
///
/// Progress is runtime-only and comes back at its default.
pub async fn load_session(pool: &SqlitePool, session_id: Uuid) -> SyncResult<Option<SyncSession>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, state, counters, item_log, errors, started_at, ended_at
        FROM sync_sessions
        WHERE session_id = ?
        "#,
    )
    .bind(session_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let state: String = row.try_get("state")?;
    let state: SessionState = serde_json::from_str(&state)?;

    let counters: String = row.try_get("counters")?;
    let counters: SessionCounters = serde_json::from_str(&counters)?;

    let item_log: String = row.try_get("item_log")?;
    let item_log: Vec<ItemLogEntry> = serde_json::from_str(&item_log)?;

    let errors: String = row.try_get("errors")?;
    let errors: Vec<SessionError> = serde_json::from_str(&errors)?;

    let started_at: String = row.try_get("started_at")?;
    let started_at = parse_timestamp(&started_at, "started_at")?;

    let ended_at: Option<String> = row.try_get("ended_at")?;
    let ended_at = ended_at
        .as_deref()
        .map(|s| parse_timestamp(s, "ended_at"))
        .transpose()?;

    Ok(Some(SyncSession {
        session_id,
        state,
        counters,
        progress: Default::default(),
        item_log,
        errors,
        started_at,
        ended_at,
    }))
}

/// Mark sessions left RUNNING by a previous process as CANCELLED
///
/// A run dies with its process; a RUNNING row at startup will never finish.
pub async fn cleanup_stale_sessions(pool: &SqlitePool) -> SyncResult<usize> {
    let result = sqlx::query(
        r#"
        UPDATE sync_sessions
        SET state = '"CANCELLED"', ended_at = ?
        WHERE state = '"RUNNING"'
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}

fn parse_timestamp(value: &str, column: &str) -> SyncResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::PersistenceFailure(format!("Failed to parse {}: {}", column, e)))
}
