//! meetsync-rc - meet results reconciliation
//!
//! Runs one reconciliation session over a working set of meets: checks
//! completeness against the source gateway, records verdicts in the ledger
//! and backfills competitor identities. Prints the session summary path.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use meetsync_common::config::{load_or_default, RootFolderInitializer, RootFolderResolver};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meetsync_rc::config::RcConfig;
use meetsync_rc::models::MeetFilter;
use meetsync_rc::services::RunRequest;
use meetsync_rc::source::{HttpSourceAdapter, RetryingSource, SourceAdapter};
use meetsync_rc::{build_orchestrator, db, RunPaths};

/// Command-line arguments for meetsync-rc
#[derive(Parser, Debug)]
#[command(name = "meetsync-rc")]
#[command(about = "Reconcile local meet results against the remote results source")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "MEETSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder for database, audit log and session summaries
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Local meet id to process (repeatable); overrides the date range
    #[arg(long = "meet")]
    meets: Vec<i64>,

    /// Earliest meet date (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Latest meet date (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Process at most this many meets
    #[arg(long)]
    max_meets: Option<usize>,

    /// Re-check meets the ledger already records as complete
    #[arg(long)]
    force_recheck: bool,

    /// Let resolved candidates overwrite fields that already hold a value
    #[arg(long)]
    overwrite_fields: bool,

    /// Trust ledger-complete meets without re-counting local results
    #[arg(long)]
    no_verify_counts: bool,
}

/// Command-line switches take precedence over the configuration file
fn apply_overrides(args: &Args, config: &mut RcConfig) {
    if args.force_recheck {
        config.batch.force_recheck = true;
    }
    if args.overwrite_fields {
        config.resolver.force = true;
    }
    if args.no_verify_counts {
        config.batch.verify_counts = false;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config: RcConfig = load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    apply_overrides(&args, &mut config);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting meetsync-rc v{}", env!("CARGO_PKG_VERSION"));

    config.validate().context("Invalid configuration")?;

    let mut filter = if args.meets.is_empty() {
        MeetFilter::by_dates(args.from, args.to)
    } else {
        MeetFilter::by_ids(args.meets.clone())
    };
    filter.max_count = args.max_meets;
    filter.validate().context("Invalid meet selection")?;

    let root_folder =
        RootFolderResolver::new(args.root_folder.clone(), config.root_folder.clone()).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root().display());

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());
    let pool = db::init_database_pool(&db_path).await?;

    let stale = db::sessions::cleanup_stale_sessions(&pool).await?;
    if stale > 0 {
        info!("Marked {} stale session(s) as cancelled", stale);
    }

    let http = HttpSourceAdapter::new(&config.source)?;
    info!("Source gateway: {}", http.base_url());
    let source: Arc<dyn SourceAdapter> = Arc::new(RetryingSource::new(http, config.retry.policy()));

    let orchestrator = build_orchestrator(
        &config,
        pool.clone(),
        source,
        RunPaths {
            audit_log: initializer.audit_log_path(),
            session_dir: initializer.session_dir(),
        },
    );

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl+C received, stopping after the current meet");
            cancel.cancel();
        }
    });

    let report = orchestrator
        .run(RunRequest::from_config(filter, &config.batch))
        .await?;

    info!(
        "Session {} {:?}: {} processed, {} failed, {} results unresolved",
        report.session_id,
        report.state,
        report.counters.processed,
        report.counters.failed,
        report.counters.results_unresolved
    );
    match &report.summary_path {
        Some(path) => println!("{}", path.display()),
        None => println!("{}", report.session_id),
    }

    pool.close().await;
    Ok(())
}
