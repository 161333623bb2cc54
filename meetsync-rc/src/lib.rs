//! meetsync-rc library interface
//!
//! Meet results reconciliation: completeness analysis against a remote
//! results source, a durable completion ledger, tiered competitor identity
//! resolution, and a batch orchestrator tying them into sessions.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod source;
pub mod utils;

pub use crate::error::{SyncError, SyncResult};

use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::RcConfig;
use crate::db::{ResultStore, SqliteStore};
use crate::services::{
    normalizer_for, AuditLog, BatchOrchestrator, DivisionCatalog, TieredResolver,
};
use crate::source::SourceAdapter;

/// Output locations of a run
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub audit_log: PathBuf,
    pub session_dir: PathBuf,
}

/// Wire store, resolver and orchestrator from a validated configuration
///
/// The division catalog and normalizer are built here, once per run.
pub fn build_orchestrator(
    config: &RcConfig,
    pool: SqlitePool,
    source: Arc<dyn SourceAdapter>,
    paths: RunPaths,
) -> BatchOrchestrator {
    let store: Arc<dyn ResultStore> = Arc::new(SqliteStore::new(pool.clone()));
    let catalog = Arc::new(DivisionCatalog::new(config.divisions.clone()));
    let audit = Arc::new(AuditLog::new(paths.audit_log));

    let resolver = TieredResolver::new(
        Arc::clone(&store),
        Arc::clone(&source),
        pool.clone(),
        catalog,
        normalizer_for(config.resolver.name_format),
        audit,
        config.resolver.clone(),
    );

    BatchOrchestrator::new(
        pool,
        store,
        source,
        resolver,
        config.batch.clone(),
        paths.session_dir,
    )
}
