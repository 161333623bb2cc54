//! Date window utilities

use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Inclusive calendar date range used for remote source searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Create a window, rejecting inverted ranges
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidInput(format!(
                "date window start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Window of `days` on either side of `center`
    ///
    /// Clamped to the representable date range.
    pub fn around(center: NaiveDate, days: u32) -> Self {
        let delta = ChronoDuration::days(i64::from(days));
        Self {
            start: center.checked_sub_signed(delta).unwrap_or(NaiveDate::MIN),
            end: center.checked_add_signed(delta).unwrap_or(NaiveDate::MAX),
        }
    }

    /// Number of days between start and end (0 for a single-day window)
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Split into an earlier and a later half that do not overlap.
    ///
    /// Returns `None` for a single-day window.
    pub fn split(&self) -> Option<(DateWindow, DateWindow)> {
        let span = self.span_days();
        if span < 1 {
            return None;
        }
        let mid = self.start + ChronoDuration::days(span / 2);
        Some((
            DateWindow {
                start: self.start,
                end: mid,
            },
            DateWindow {
                start: mid + ChronoDuration::days(1),
                end: self.end,
            },
        ))
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
