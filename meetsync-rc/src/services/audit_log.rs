//! Append-only field update audit log (JSON Lines)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{SyncError, SyncResult};
use crate::models::ResolverTier;

/// One written field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub result_id: i64,
    pub field: String,
    pub before: Option<String>,
    pub after: String,
    pub tier: ResolverTier,
    pub divisions_searched: Vec<String>,
    pub search_span_days: i64,
}

pub struct AuditLog {
    path: PathBuf,
    // Serializes appends from one process
    lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append entries as one JSON object per line
    pub fn append(&self, entries: &[AuditEntry]) -> SyncResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut buffer = String::new();
        for entry in entries {
            buffer.push_str(&serde_json::to_string(entry)?);
            buffer.push('\n');
        }

        let _guard = self
            .lock
            .lock()
            .map_err(|_| SyncError::PersistenceFailure("audit log lock poisoned".to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buffer.as_bytes())?;
        Ok(())
    }

    /// Read every entry back (used by reporting and tests)
    pub fn read_all(&self) -> SyncResult<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(SyncError::from))
            .collect()
    }
}
