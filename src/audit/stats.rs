//! Aggregate statistics over an audit log

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

use super::AuditRecord;
use crate::decision::DecisionKind;

/// Counts for calibration reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditStats {
    pub decisions: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub opened: usize,
    pub stop_moves: usize,
    pub rejections: BTreeMap<&'static str, usize>,
    pub exits: BTreeMap<&'static str, usize>,
    pub counterfactuals: usize,
    pub verdicts: BTreeMap<&'static str, usize>,
    /// Counterfactuals that vindicated the original decision
    pub vindicated: usize,
}

impl AuditStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AuditRecord>) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.observe(record);
        }
        stats
    }

    pub fn observe(&mut self, record: &AuditRecord) {
        match record {
            AuditRecord::Decision(decision) => {
                self.decisions += 1;
                match decision.kind {
                    DecisionKind::SignalAccepted => self.accepted += 1,
                    DecisionKind::SignalRejected { reason } => {
                        self.rejected += 1;
                        *self.rejections.entry(reason.code()).or_default() += 1;
                    }
                    DecisionKind::PositionOpened => self.opened += 1,
                    DecisionKind::Breakeven
                    | DecisionKind::TrailingActivated { .. }
                    | DecisionKind::TrailingTightened { .. } => self.stop_moves += 1,
                    DecisionKind::Exit { kind } => {
                        *self.exits.entry(kind.code()).or_default() += 1;
                    }
                }
            }
            AuditRecord::Counterfactual(cf) => {
                // Logged at creation and again at resolution; only the latter counts
                let Some(verdict) = cf.verdict() else {
                    return;
                };
                self.counterfactuals += 1;
                *self.verdicts.entry(verdict.code()).or_default() += 1;
                if verdict.vindicates() {
                    self.vindicated += 1;
                }
            }
        }
    }

    /// Rejection reasons, most frequent first
    pub fn top_rejections(&self, n: usize) -> Vec<(&'static str, usize)> {
        let mut reasons: Vec<_> = self.rejections.iter().map(|(k, v)| (*k, *v)).collect();
        reasons.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        reasons.truncate(n);
        reasons
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Signals: {} accepted, {} rejected",
            self.accepted, self.rejected
        );
        let _ = writeln!(
            out,
            "Positions: {} opened, {} stop moves",
            self.opened, self.stop_moves
        );
        for (reason, count) in self.top_rejections(5) {
            let _ = writeln!(out, "  reject {reason}: {count}");
        }
        for (kind, count) in &self.exits {
            let _ = writeln!(out, "  exit {kind}: {count}");
        }
        let _ = writeln!(
            out,
            "Counterfactuals: {} resolved, {} vindicated",
            self.counterfactuals, self.vindicated
        );
        for (verdict, count) in &self.verdicts {
            let _ = writeln!(out, "  {verdict}: {count}");
        }
        out
    }
}
