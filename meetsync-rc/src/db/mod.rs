//! Database access for meetsync-rc
//!
//! One SQLite database holds the results store (`meets`, `competitors`,
//! `results`), the completion ledger, the unresolved list and session records.

pub mod ledger;
pub mod sessions;
pub mod store;
pub mod unresolved;

pub use store::{ResultStore, SqliteStore};

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (or create) the database and ensure tables exist
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with tables created
///
/// Every connection to `sqlite::memory:` is a separate database, so the pool
/// is capped at one connection.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create all tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meets (
            local_id INTEGER PRIMARY KEY,
            remote_id TEXT UNIQUE,
            name TEXT NOT NULL,
            date TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS competitors (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            remote_competitor_id TEXT,
            birth_year INTEGER,
            gender TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS results (
            id INTEGER PRIMARY KEY,
            meet_id INTEGER NOT NULL REFERENCES meets(local_id),
            competitor_id INTEGER REFERENCES competitors(id),
            competitor_name TEXT NOT NULL,
            division TEXT NOT NULL,
            total REAL,
            bodyweight REAL,
            place INTEGER,
            birth_year INTEGER,
            age INTEGER,
            club TEXT,
            region TEXT,
            gender TEXT,
            remote_competitor_id TEXT,
            resolved_tier TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_results_meet ON results(meet_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS completeness_ledger (
            meet_id INTEGER PRIMARY KEY,
            remote_count INTEGER NOT NULL,
            local_count INTEGER NOT NULL,
            is_complete INTEGER NOT NULL,
            discrepancy INTEGER NOT NULL,
            status TEXT NOT NULL,
            last_checked_at TEXT NOT NULL,
            completed_at TEXT,
            error_log TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS unresolved_results (
            result_id INTEGER PRIMARY KEY,
            meet_id INTEGER NOT NULL,
            competitor_name TEXT NOT NULL,
            reason TEXT NOT NULL,
            first_attempt_at TEXT NOT NULL,
            last_attempt_at TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_sessions (
            session_id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            counters TEXT NOT NULL,
            item_log TEXT NOT NULL DEFAULT '[]',
            errors TEXT NOT NULL DEFAULT '[]',
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!(
        "Database tables initialized (meets, competitors, results, completeness_ledger, unresolved_results, sync_sessions)"
    );

    Ok(())
}
