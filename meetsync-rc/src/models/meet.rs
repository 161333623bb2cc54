//! Meet records and working set filters

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// A competition meet as held by the local store
///
/// Created by ingestion outside this crate; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetRecord {
    pub local_id: i64,
    /// Identifier on the remote source, unique when present
    pub remote_id: Option<String>,
    pub name: String,
    pub date: NaiveDate,
}

/// Selection of candidate meets from the store
///
/// Explicit ids take precedence over the date range. Store ordering
/// (date, then local id) is preserved by every consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetFilter {
    #[serde(default)]
    pub ids: Vec<i64>,
    #[serde(default)]
    pub date_from: Option<NaiveDate>,
    #[serde(default)]
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub max_count: Option<usize>,
}

impl MeetFilter {
    pub fn by_ids(ids: Vec<i64>) -> Self {
        Self {
            ids,
            ..Default::default()
        }
    }

    pub fn by_dates(date_from: Option<NaiveDate>, date_to: Option<NaiveDate>) -> Self {
        Self {
            date_from,
            date_to,
            ..Default::default()
        }
    }

    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = Some(max_count);
        self
    }

    /// Reject filters that cannot select anything sensible
    pub fn validate(&self) -> SyncResult<()> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(SyncError::ValidationError(format!(
                    "date_from {} is after date_to {}",
                    from, to
                )));
            }
        }
        if self.max_count == Some(0) {
            return Err(SyncError::ValidationError(
                "max_count must be greater than zero".to_string(),
            ));
        }
        if self.ids.iter().any(|id| *id <= 0) {
            return Err(SyncError::ValidationError(
                "meet ids must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverted_range_rejected() {
        let filter = MeetFilter::by_dates(
            NaiveDate::from_ymd_opt(2024, 6, 1),
            NaiveDate::from_ymd_opt(2024, 1, 1),
        );
        assert!(matches!(filter.validate(), Err(SyncError::ValidationError(_))));
    }

    #[test]
    fn test_zero_max_count_rejected() {
        let filter = MeetFilter::default().with_max_count(0);
        assert!(filter.validate().is_err());
    }

    #[test]
    fn test_default_filter_is_valid() {
        assert!(MeetFilter::default().validate().is_ok());
        assert!(MeetFilter::by_ids(vec![3, 1]).validate().is_ok());
    }
}
