//! Competition history matching for duplicate-identity disambiguation

use crate::models::{HistoryEntry, MeetRecord};

fn normalize_meet_name(name: &str) -> String {
    name.split_whitespace()
        .map(|t| {
            t.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when `history` contains the target meet
///
/// Meet name (case and punctuation insensitive) and date must match. When
/// both the stored total and the history total are known they must agree
/// within `total_tolerance`.
pub fn history_contains_meet(
    history: &[HistoryEntry],
    meet: &MeetRecord,
    total: Option<f64>,
    total_tolerance: f64,
) -> bool {
    let target = normalize_meet_name(&meet.name);
    history.iter().any(|entry| {
        entry.date == meet.date
            && normalize_meet_name(&entry.meet_name) == target
            && match (total, entry.total) {
                (Some(local), Some(remote)) => (local - remote).abs() <= total_tolerance,
                _ => true,
            }
    })
}
