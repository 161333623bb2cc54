//! Reconciliation services
//!
//! Analyzer and ledger decide which meets need work; the resolver backfills
//! competitor identities; the orchestrator drives both over a working set.

pub mod audit_log;
pub mod batch_orchestrator;
pub mod completeness_analyzer;
pub mod completion_ledger;
pub mod division_catalog;
pub mod identity_resolver;
pub mod name_normalizer;

pub use audit_log::{AuditEntry, AuditLog};
pub use batch_orchestrator::{BatchOrchestrator, MeetReprocessor, RunRequest, SessionReport};
pub use completeness_analyzer::CompletenessAnalyzer;
pub use completion_ledger::{CompletionLedger, SkipOptions};
pub use division_catalog::{Division, DivisionCatalog};
pub use identity_resolver::{ResolutionOutcome, ResultDisposition, TieredResolver};
pub use name_normalizer::{normalizer_for, CapitalizationNormalizer, CaseFoldNormalizer, NameNormalizer};
