//! Decision and reason types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Why a signal was not traded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Daily drawdown at or beyond the limit
    DailyDrawdown,
    /// Total drawdown at or beyond the (margin-adjusted) limit
    TotalDrawdown,
    /// Open position count at cap
    MaxPositions,
    /// Cumulative open risk at cap
    OpenRiskLimit,
    /// Trades opened today at cap
    MaxDailyTrades,
    /// Instrument already has an open position
    DuplicateInstrument,
    /// Volatility band too narrow to trade
    VolatilitySqueeze,
    /// Spread too wide relative to ATR
    SpreadTooWide,
    /// Estimated fill too far from the signal price relative to ATR
    SlippageTooHigh,
    /// Signal failed producer-boundary validation
    InvalidSignal,
    /// Sizing produced no tradeable risk
    ZeroSize,
}

impl RejectReason {
    /// Stable code for reports and metrics
    pub fn code(self) -> &'static str {
        match self {
            RejectReason::DailyDrawdown => "daily_drawdown",
            RejectReason::TotalDrawdown => "total_drawdown",
            RejectReason::MaxPositions => "max_positions",
            RejectReason::OpenRiskLimit => "open_risk_limit",
            RejectReason::MaxDailyTrades => "max_daily_trades",
            RejectReason::DuplicateInstrument => "duplicate_instrument",
            RejectReason::VolatilitySqueeze => "volatility_squeeze",
            RejectReason::SpreadTooWide => "spread_too_wide",
            RejectReason::SlippageTooHigh => "slippage_too_high",
            RejectReason::InvalidSignal => "invalid_signal",
            RejectReason::ZeroSize => "zero_size",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// How a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    /// Original stop hit
    StopLoss,
    /// Stop hit after it was moved in the position's favor
    TrailingStop,
    /// Original target hit
    TakeProfit,
    /// Target hit only because the ROI schedule lowered it
    Roi,
    /// Profit built then eroded with weak momentum
    Giveback,
    /// Stagnant position in a contracting market
    Deadfish,
    /// Bar-count ceiling reached
    TimeStop,
    /// Closed on request of the caller
    Manual,
    /// Forced close at the end of historical data
    EndOfData,
}

impl ExitKind {
    /// Stable code for reports and metrics
    pub fn code(self) -> &'static str {
        match self {
            ExitKind::StopLoss => "stop_loss",
            ExitKind::TrailingStop => "trailing_stop",
            ExitKind::TakeProfit => "take_profit",
            ExitKind::Roi => "roi",
            ExitKind::Giveback => "giveback",
            ExitKind::Deadfish => "deadfish",
            ExitKind::TimeStop => "time_stop",
            ExitKind::Manual => "manual",
            ExitKind::EndOfData => "end_of_data",
        }
    }

    /// Early exits chosen by policy, tracked by a counterfactual
    pub fn is_discretionary(self) -> bool {
        matches!(self, ExitKind::Giveback | ExitKind::Deadfish)
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// What a decision did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionKind {
    SignalAccepted,
    SignalRejected { reason: RejectReason },
    PositionOpened,
    Breakeven,
    TrailingActivated { tier: u8 },
    TrailingTightened { tier: u8 },
    Exit { kind: ExitKind },
}

impl DecisionKind {
    /// Stable code for reports and metrics
    pub fn code(&self) -> &'static str {
        match self {
            DecisionKind::SignalAccepted => "signal_accepted",
            DecisionKind::SignalRejected { .. } => "signal_rejected",
            DecisionKind::PositionOpened => "position_opened",
            DecisionKind::Breakeven => "breakeven",
            DecisionKind::TrailingActivated { .. } => "trailing_activated",
            DecisionKind::TrailingTightened { .. } => "trailing_tightened",
            DecisionKind::Exit { .. } => "exit",
        }
    }
}

/// Numeric field touched by a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Stop,
    TrailingTier,
    Balance,
}

/// Before/after value of a changed field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: Field,
    pub before: Decimal,
    pub after: Decimal,
}

impl FieldChange {
    pub fn new(field: Field, before: Decimal, after: Decimal) -> Self {
        Self {
            field,
            before,
            after,
        }
    }
}

/// Immutable audit record of one state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    /// Market time of the event that produced the decision
    pub timestamp: DateTime<Utc>,
    pub kind: DecisionKind,
    pub instrument: String,
    pub signal_id: Option<Uuid>,
    pub position_id: Option<Uuid>,
    /// Human-readable detail
    pub reason: String,
    /// Price at decision time (estimated fill, stop, exit price...)
    pub price: Decimal,
    /// Quote spread when the decision was taken against a quote
    pub spread: Option<Decimal>,
    /// Changed numeric fields
    pub changes: Vec<FieldChange>,
    /// Realized result in R, for exits
    pub result_r: Option<Decimal>,
}

impl Decision {
    pub fn new(
        kind: DecisionKind,
        instrument: impl Into<String>,
        timestamp: DateTime<Utc>,
        price: Decimal,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            kind,
            instrument: instrument.into(),
            signal_id: None,
            position_id: None,
            reason: reason.into(),
            price,
            spread: None,
            changes: Vec::new(),
            result_r: None,
        }
    }

    pub fn with_signal(mut self, signal_id: Uuid) -> Self {
        self.signal_id = Some(signal_id);
        self
    }

    pub fn with_position(mut self, position_id: Uuid) -> Self {
        self.position_id = Some(position_id);
        self
    }

    pub fn with_spread(mut self, spread: Decimal) -> Self {
        self.spread = Some(spread);
        self
    }

    pub fn with_change(mut self, field: Field, before: Decimal, after: Decimal) -> Self {
        self.changes.push(FieldChange::new(field, before, after));
        self
    }

    pub fn with_result(mut self, result_r: Decimal) -> Self {
        self.result_r = Some(result_r);
        self
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.kind, DecisionKind::SignalAccepted)
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self.kind {
            DecisionKind::SignalRejected { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn exit_kind(&self) -> Option<ExitKind> {
        match self.kind {
            DecisionKind::Exit { kind } => Some(kind),
            _ => None,
        }
    }

    /// New stop level, if this decision moved the stop
    pub fn new_stop(&self) -> Option<Decimal> {
        self.changes
            .iter()
            .find(|c| c.field == Field::Stop)
            .map(|c| c.after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_reject_codes_are_stable() {
        assert_eq!(RejectReason::DailyDrawdown.code(), "daily_drawdown");
        assert_eq!(RejectReason::SlippageTooHigh.to_string(), "slippage_too_high");
        let json = serde_json::to_string(&RejectReason::OpenRiskLimit).unwrap();
        assert_eq!(json, "\"open_risk_limit\"");
    }

    #[test]
    fn test_discretionary_exits() {
        assert!(ExitKind::Giveback.is_discretionary());
        assert!(ExitKind::Deadfish.is_discretionary());
        assert!(!ExitKind::TimeStop.is_discretionary());
        assert!(!ExitKind::TrailingStop.is_discretionary());
    }

    #[test]
    fn test_decision_kind_tagged_json() {
        let kind = DecisionKind::Exit {
            kind: ExitKind::Roi,
        };
        let json = serde_json::to_value(kind).unwrap();
        assert_eq!(json["type"], "exit");
        assert_eq!(json["kind"], "roi");

        let back: DecisionKind =
            serde_json::from_str(r#"{"type":"signal_rejected","reason":"volatility_squeeze"}"#)
                .unwrap();
        assert_eq!(
            back,
            DecisionKind::SignalRejected {
                reason: RejectReason::VolatilitySqueeze
            }
        );
    }

    #[test]
    fn test_decision_accessors() {
        let decision = Decision::new(
            DecisionKind::TrailingTightened { tier: 2 },
            "EURUSD",
            ts(),
            dec!(1.1),
            "tier 2",
        )
        .with_change(Field::Stop, dec!(1.09), dec!(1.095))
        .with_change(Field::TrailingTier, dec!(1), dec!(2));

        assert_eq!(decision.new_stop(), Some(dec!(1.095)));
        assert!(decision.exit_kind().is_none());
        assert!(decision.reject_reason().is_none());
        assert!(!decision.is_accepted());
    }

    #[test]
    fn test_reject_reason_accessor() {
        let decision = Decision::new(
            DecisionKind::SignalRejected {
                reason: RejectReason::MaxPositions,
            },
            "EURUSD",
            ts(),
            dec!(1.1),
            "3/3",
        );
        assert_eq!(decision.reject_reason(), Some(RejectReason::MaxPositions));
    }
}
