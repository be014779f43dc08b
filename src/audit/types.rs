//! Audit record types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::counterfactual::Counterfactual;
use crate::decision::Decision;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Audit encoding error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Malformed audit line {line}: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },
}

/// One line of the audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum AuditRecord {
    Decision(Decision),
    Counterfactual(Counterfactual),
}

impl From<Decision> for AuditRecord {
    fn from(decision: Decision) -> Self {
        AuditRecord::Decision(decision)
    }
}

impl From<Counterfactual> for AuditRecord {
    fn from(counterfactual: Counterfactual) -> Self {
        AuditRecord::Counterfactual(counterfactual)
    }
}
