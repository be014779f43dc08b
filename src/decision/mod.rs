//! Decision model
//!
//! Closed variant types for every transition the core can make, and the
//! append-only `Decision` record handed to the audit sink

mod types;

pub use types::{Decision, DecisionKind, ExitKind, Field, FieldChange, RejectReason};
