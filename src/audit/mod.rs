//! Audit log
//!
//! Every decision and resolved counterfactual is handed to an injected
//! append-only sink, one record per event, for offline analysis.

mod sink;
mod stats;
mod types;

pub use sink::{AuditSink, JsonlAuditSink, MemoryAuditSink};
pub use stats::AuditStats;
pub use types::{AuditError, AuditRecord};
