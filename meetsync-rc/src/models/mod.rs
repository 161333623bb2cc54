//! Data models for meetsync-rc

pub mod candidate;
pub mod meet;
pub mod result_record;
pub mod sync_session;
pub mod verdict;

pub use candidate::{dedup_candidates, CompetitorCandidate, CompetitorIdentity, Gender, HistoryEntry};
pub use meet::{MeetFilter, MeetRecord};
pub use result_record::{FieldChange, ResolverTier, ResultFilter, ResultPatch, ResultRecord};
pub use sync_session::{
    ItemLogEntry, ItemOutcome, SessionCounters, SessionError, SessionProgress, SessionState,
    StateTransition, SyncSession,
};
pub use verdict::{CompletenessStatus, CompletenessVerdict};
