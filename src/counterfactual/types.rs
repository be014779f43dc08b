//! Counterfactual types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::{ExitKind, RejectReason};
use crate::feed::Bar;
use crate::position::Position;
use crate::signal::{Side, Signal};

/// Decision being second-guessed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum CounterfactualOrigin {
    Rejection {
        reason: RejectReason,
    },
    EarlyExit {
        kind: ExitKind,
        exit_price: Decimal,
        exit_r: Decimal,
    },
}

/// How the hypothetical trade ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    StopHit,
    TargetHit,
    Timeout,
}

/// Calibration verdict on the original decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Rejected trade would have been stopped out
    GoodReject,
    /// Rejected trade would have reached its target
    MissedGain,
    /// Exited trade would have been stopped out
    GoodExit,
    /// Exited trade would have reached its target
    PrematureExit,
    TimeoutPositive,
    TimeoutNegative,
}

impl Verdict {
    pub fn code(self) -> &'static str {
        match self {
            Verdict::GoodReject => "good_reject",
            Verdict::MissedGain => "missed_gain",
            Verdict::GoodExit => "good_exit",
            Verdict::PrematureExit => "premature_exit",
            Verdict::TimeoutPositive => "timeout_positive",
            Verdict::TimeoutNegative => "timeout_negative",
        }
    }

    /// True when the original decision turned out right
    pub fn vindicates(self) -> bool {
        matches!(
            self,
            Verdict::GoodReject | Verdict::GoodExit | Verdict::TimeoutNegative
        )
    }
}

/// Final state of a counterfactual
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub outcome: Outcome,
    pub price: Decimal,
    pub result_r: Decimal,
    pub bars: u32,
    pub resolved_at: DateTime<Utc>,
    pub verdict: Verdict,
}

/// Hypothetical trade tracked against real price action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterfactual {
    pub id: Uuid,
    pub signal_id: Uuid,
    pub position_id: Option<Uuid>,
    pub instrument: String,
    pub side: Side,
    pub origin: CounterfactualOrigin,
    pub entry: Decimal,
    pub stop: Decimal,
    pub target: Option<Decimal>,
    risk_unit: Decimal,
    /// Bars at or before this time are ignored
    pub created_at: DateTime<Utc>,
    pub bars_tracked: u32,
    pub favorable_extreme: Decimal,
    pub adverse_extreme: Decimal,
    pub resolution: Option<Resolution>,
}

impl Counterfactual {
    /// What-if for a rejected signal, entered at the estimated fill.
    ///
    /// `None` when the signal has no usable risk distance.
    pub fn for_rejection(signal: &Signal, reason: RejectReason, entry: Decimal) -> Option<Self> {
        let risk_unit = signal.risk_distance();
        if risk_unit <= Decimal::ZERO || entry <= Decimal::ZERO || signal.stop <= Decimal::ZERO {
            return None;
        }
        let side = signal.side;
        Some(Self {
            id: Uuid::new_v4(),
            signal_id: signal.id,
            position_id: None,
            instrument: signal.instrument.clone(),
            side,
            origin: CounterfactualOrigin::Rejection { reason },
            entry,
            stop: side.offset(entry, -risk_unit),
            target: signal.target_distance().map(|d| side.offset(entry, d)),
            risk_unit,
            created_at: signal.timestamp,
            bars_tracked: 0,
            favorable_extreme: entry,
            adverse_extreme: entry,
            resolution: None,
        })
    }

    /// What-if for a discretionary exit: the position held with its initial
    /// stop and original target
    pub fn for_early_exit(
        position: &Position,
        kind: ExitKind,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            signal_id: position.signal_id,
            position_id: Some(position.id),
            instrument: position.instrument.clone(),
            side: position.side,
            origin: CounterfactualOrigin::EarlyExit {
                kind,
                exit_price,
                exit_r: position.r_at(exit_price),
            },
            entry: position.entry_price,
            stop: position.initial_stop,
            target: position.target,
            risk_unit: position.r(),
            created_at: exit_time,
            bars_tracked: 0,
            favorable_extreme: exit_price,
            adverse_extreme: exit_price,
            resolution: None,
        }
    }

    pub fn r(&self) -> Decimal {
        self.risk_unit
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    pub fn verdict(&self) -> Option<Verdict> {
        self.resolution.map(|r| r.verdict)
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self.origin, CounterfactualOrigin::Rejection { .. })
    }

    fn r_at(&self, price: Decimal) -> Decimal {
        self.side.favorable_move(self.entry, price) / self.risk_unit
    }

    /// Feed one bar. Returns true if this bar resolved the counterfactual.
    pub(crate) fn observe(&mut self, bar: &Bar, max_bars: u32) -> bool {
        if self.is_resolved() || bar.instrument != self.instrument || bar.timestamp <= self.created_at
        {
            return false;
        }
        self.bars_tracked += 1;

        let (best, worst) = match self.side {
            Side::Long => (bar.high, bar.low),
            Side::Short => (bar.low, bar.high),
        };
        if self.side.is_better(best, self.favorable_extreme) {
            self.favorable_extreme = best;
        }
        if self.side.is_better(self.adverse_extreme, worst) {
            self.adverse_extreme = worst;
        }

        let stop_hit = !self.side.is_better(worst, self.stop);
        let target_hit = self
            .target
            .is_some_and(|target| !self.side.is_better(target, best));

        let (outcome, price) = if stop_hit {
            (Outcome::StopHit, self.stop)
        } else if target_hit {
            match self.target {
                Some(target) => (Outcome::TargetHit, target),
                None => return false,
            }
        } else if self.bars_tracked >= max_bars {
            (Outcome::Timeout, bar.close)
        } else {
            return false;
        };

        let result_r = self.r_at(price);
        self.resolution = Some(Resolution {
            outcome,
            price,
            result_r,
            bars: self.bars_tracked,
            resolved_at: bar.timestamp,
            verdict: self.verdict_for(outcome, result_r),
        });
        true
    }

    fn verdict_for(&self, outcome: Outcome, result_r: Decimal) -> Verdict {
        match (outcome, self.is_rejection()) {
            (Outcome::StopHit, true) => Verdict::GoodReject,
            (Outcome::StopHit, false) => Verdict::GoodExit,
            (Outcome::TargetHit, true) => Verdict::MissedGain,
            (Outcome::TargetHit, false) => Verdict::PrematureExit,
            (Outcome::Timeout, _) if result_r > Decimal::ZERO => Verdict::TimeoutPositive,
            (Outcome::Timeout, _) => Verdict::TimeoutNegative,
        }
    }
}
