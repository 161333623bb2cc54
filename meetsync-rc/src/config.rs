//! Configuration for meetsync-rc
//!
//! Bootstrap settings come from a TOML file (see `meetsync_common::config` for
//! file location). Every section has built-in defaults, so an absent file or an
//! absent section is valid. `RcConfig::validate` runs before any remote call or
//! write; a failure aborts the run with `ValidationError`.

use meetsync_common::config::LoggingConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::services::division_catalog::Division;
use crate::source::retry::RetryPolicy;

/// Complete runtime configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RcConfig {
    /// Root folder for database, audit log and session summaries
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    /// Division lookup table for broadened searches
    #[serde(default)]
    pub divisions: Vec<Division>,
}

/// Remote source gateway connection
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Rate limit applied to every gateway request
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            requests_per_second: default_requests_per_second(),
            user_agent: default_user_agent(),
        }
    }
}

/// Timeout and backoff for every adapter call
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }
}

/// Name normalization strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameFormat {
    /// Detect "LASTNAME Firstname" by capitalization and reorder
    Capitalization,
    /// Case-fold and collapse whitespace only
    CaseFold,
}

/// Identity resolver tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Days either side of the stored meet date for tiers A and B
    #[serde(default = "default_tier_a_window_days")]
    pub tier_a_window_days: u32,
    /// Days either side of the meet date for tier C
    #[serde(default = "default_tier_c_window_days")]
    pub tier_c_window_days: u32,
    /// Unfiltered spans longer than this that return nothing are split
    #[serde(default = "default_split_threshold_days")]
    pub split_threshold_days: u32,
    #[serde(default = "default_max_split_depth")]
    pub max_split_depth: u32,
    /// Allowed difference between stored and remote totals in tier D
    #[serde(default = "default_total_tolerance")]
    pub total_tolerance: f64,
    #[serde(default = "default_max_broadened_divisions")]
    pub max_broadened_divisions: usize,
    /// Weight-class distance (kg) still considered "near" in tier C
    #[serde(default = "default_weight_proximity_kg")]
    pub weight_proximity_kg: f64,
    /// Overwrite non-null fields
    #[serde(default)]
    pub force: bool,
    /// Search results already on the unresolved list
    #[serde(default)]
    pub retry_unresolved: bool,
    #[serde(default = "default_true")]
    pub enable_tier_b: bool,
    #[serde(default = "default_true")]
    pub enable_tier_c: bool,
    #[serde(default = "default_true")]
    pub enable_tier_d: bool,
    #[serde(default = "default_name_format")]
    pub name_format: NameFormat,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tier_a_window_days: default_tier_a_window_days(),
            tier_c_window_days: default_tier_c_window_days(),
            split_threshold_days: default_split_threshold_days(),
            max_split_depth: default_max_split_depth(),
            total_tolerance: default_total_tolerance(),
            max_broadened_divisions: default_max_broadened_divisions(),
            weight_proximity_kg: default_weight_proximity_kg(),
            force: false,
            retry_unresolved: false,
            enable_tier_b: true,
            enable_tier_c: true,
            enable_tier_d: true,
            name_format: default_name_format(),
        }
    }
}

/// Batching and reporting
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batches to respect source rate limits
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,
    /// Emit a progress snapshot every N processed meets
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
    /// Re-check the local count of ledger-complete meets
    #[serde(default = "default_true")]
    pub verify_counts: bool,
    /// Ignore cached ledger decisions
    #[serde(default)]
    pub force_recheck: bool,
    /// Run the identity resolver over each processed meet
    #[serde(default = "default_true")]
    pub resolve_identities: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            progress_interval: default_progress_interval(),
            verify_counts: true,
            force_recheck: false,
            resolve_identities: true,
        }
    }
}

impl BatchConfig {
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8711".to_string()
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_requests_per_second() -> u32 {
    1
}
fn default_user_agent() -> String {
    format!("meetsync-rc/{}", env!("CARGO_PKG_VERSION"))
}
fn default_max_attempts() -> u32 {
    4
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    8_000
}
fn default_call_timeout_ms() -> u64 {
    45_000
}
fn default_tier_a_window_days() -> u32 {
    3
}
fn default_tier_c_window_days() -> u32 {
    300
}
fn default_split_threshold_days() -> u32 {
    365
}
fn default_max_split_depth() -> u32 {
    4
}
fn default_total_tolerance() -> f64 {
    2.5
}
fn default_max_broadened_divisions() -> usize {
    12
}
fn default_weight_proximity_kg() -> f64 {
    10.0
}
fn default_name_format() -> NameFormat {
    NameFormat::Capitalization
}
fn default_batch_size() -> usize {
    10
}
fn default_inter_batch_delay_ms() -> u64 {
    5_000
}
fn default_progress_interval() -> usize {
    10
}
fn default_true() -> bool {
    true
}

/// Widest search window or split threshold accepted, in days
pub const MAX_WINDOW_DAYS: u32 = 3650;

impl RcConfig {
    /// Parse from TOML text
    pub fn from_toml_str(content: &str) -> SyncResult<Self> {
        toml::from_str(content)
            .map_err(|e| SyncError::ValidationError(format!("Parse config failed: {}", e)))
    }

    /// Reject configurations that would misbehave at runtime
    pub fn validate(&self) -> SyncResult<()> {
        let fail = |msg: &str| Err(SyncError::ValidationError(msg.to_string()));

        if self.source.base_url.trim().is_empty() {
            return fail("source.base_url must not be empty");
        }
        if self.source.requests_per_second == 0 {
            return fail("source.requests_per_second must be greater than zero");
        }
        if self.retry.max_attempts == 0 {
            return fail("retry.max_attempts must be at least 1");
        }
        if self.retry.call_timeout_ms == 0 {
            return fail("retry.call_timeout_ms must be greater than zero");
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return fail("retry.initial_backoff_ms must not exceed retry.max_backoff_ms");
        }
        if self.resolver.tier_a_window_days == 0 || self.resolver.tier_c_window_days == 0 {
            return fail("resolver windows must be greater than zero days");
        }
        if self.resolver.split_threshold_days == 0 {
            return fail("resolver.split_threshold_days must be greater than zero");
        }
        let widest = self
            .resolver
            .tier_a_window_days
            .max(self.resolver.tier_c_window_days)
            .max(self.resolver.split_threshold_days);
        if widest > MAX_WINDOW_DAYS {
            return Err(SyncError::ValidationError(format!(
                "resolver windows must not exceed {} days",
                MAX_WINDOW_DAYS
            )));
        }
        if self.resolver.total_tolerance < 0.0 || self.resolver.weight_proximity_kg < 0.0 {
            return fail("resolver tolerances must not be negative");
        }
        if self.batch.batch_size == 0 {
            return fail("batch.batch_size must be greater than zero");
        }
        if self.batch.progress_interval == 0 {
            return fail("batch.progress_interval must be greater than zero");
        }

        let mut codes = HashSet::new();
        for division in &self.divisions {
            if !codes.insert(division.code.as_str()) {
                return Err(SyncError::ValidationError(format!(
                    "duplicate division code '{}'",
                    division.code
                )));
            }
        }

        Ok(())
    }
}
