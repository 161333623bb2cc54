//! Error types for meetsync-rc
//!
//! Errors fall into five categories that decide how a run reacts:
//! - `SourceUnavailable`: retryable with backoff
//! - `SourceFormatChanged`: surfaced, never retried within a run
//! - `AmbiguousIdentity`: not fatal, routed to the unresolved list
//! - `PersistenceFailure`: logged, ledger falls back to unknown
//! - `ValidationError`: fails fast before any remote call

use thiserror::Error;

/// Reconciliation error type
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network, timeout or navigation failure at the remote source
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Expected structure missing from a source response
    #[error("Source format changed: {0}")]
    SourceFormatChanged(String),

    /// No disambiguating signal for a competitor identity
    #[error("Ambiguous identity: {0}")]
    AmbiguousIdentity(String),

    /// Ledger or store I/O failure
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Bad filter or configuration
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// meetsync-common error
    #[error("Common error: {0}")]
    Common(#[from] meetsync_common::Error),
}

impl SyncError {
    /// Only transient source failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::SourceUnavailable(_))
    }

    /// Short category name used in session error records
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::SourceUnavailable(_) => "source_unavailable",
            SyncError::SourceFormatChanged(_) => "source_format_changed",
            SyncError::AmbiguousIdentity(_) => "ambiguous_identity",
            SyncError::PersistenceFailure(_) | SyncError::Database(_) => "persistence_failure",
            SyncError::ValidationError(_) => "validation_error",
            SyncError::Common(meetsync_common::Error::Config(_))
            | SyncError::Common(meetsync_common::Error::InvalidInput(_)) => "validation_error",
            SyncError::Common(_) => "persistence_failure",
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::PersistenceFailure(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::PersistenceFailure(format!("JSON serialization failed: {}", err))
    }
}

/// Result type for reconciliation operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_source_unavailable_is_retryable() {
        assert!(SyncError::SourceUnavailable("timeout".into()).is_retryable());
        assert!(!SyncError::SourceFormatChanged("no table".into()).is_retryable());
        assert!(!SyncError::AmbiguousIdentity("two matches".into()).is_retryable());
        assert!(!SyncError::PersistenceFailure("disk".into()).is_retryable());
        assert!(!SyncError::ValidationError("batch_size".into()).is_retryable());
    }

    #[test]
    fn test_io_error_maps_to_persistence_failure() {
        let err: SyncError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert_eq!(err.kind(), "persistence_failure");
    }

    #[test]
    fn test_common_config_error_is_validation() {
        let err: SyncError = meetsync_common::Error::Config("bad".into()).into();
        assert_eq!(err.kind(), "validation_error");
    }
}
