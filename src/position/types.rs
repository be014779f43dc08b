//! Position types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::decision::ExitKind;
use crate::feed::Bar;
use crate::risk::RiskError;
use crate::signal::{IndicatorSnapshot, Side, Signal, StrategyKind};

/// Position manager errors.
///
/// All of these indicate a caller defect rather than a market condition.
#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("Unknown position: {0}")]
    NotFound(Uuid),
    #[error("Position {0} is closed")]
    AlreadyClosed(Uuid),
    #[error("Out-of-order bar for position {id}: {got} not after {last}")]
    OutOfOrderBar {
        id: Uuid,
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },
    #[error("Bar for {got} sent to position on {expected}")]
    InstrumentMismatch { expected: String, got: String },
    #[error("Invalid fill: {0}")]
    InvalidFill(String),
    #[error(transparent)]
    Account(#[from] RiskError),
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed {
        kind: ExitKind,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
        result_r: Decimal,
    },
}

/// A filled position and its per-bar management state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub signal_id: Uuid,
    pub instrument: String,
    pub side: Side,
    pub strategy: StrategyKind,
    pub sub_type: String,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub initial_stop: Decimal,
    /// Live stop, only ever moves in the position's favor
    pub stop: Decimal,
    pub target: Option<Decimal>,
    /// |entry - initial_stop|, fixed at fill
    risk_unit: Decimal,
    pub risk_cash: Decimal,
    pub volume: Decimal,
    pub atr_at_entry: Decimal,
    pub bars_open: u32,
    /// Best price reached while open
    pub favorable_extreme: Decimal,
    /// Worst price reached while open
    pub adverse_extreme: Decimal,
    pub last_close: Decimal,
    pub last_bar_time: Option<DateTime<Utc>>,
    pub indicators: IndicatorSnapshot,
    pub breakeven_set: bool,
    /// Highest trailing tier applied (0 = none)
    pub trailing_tier: u8,
    pub status: PositionStatus,
}

impl Position {
    /// Build a position from a realized fill.
    ///
    /// Stop and target are re-anchored at the signal's distances from the
    /// fill so that entry slippage changes neither R nor reward/risk.
    pub(crate) fn from_fill(
        signal: &Signal,
        fill_price: Decimal,
        fill_time: DateTime<Utc>,
        risk_cash: Decimal,
        volume: Decimal,
    ) -> Result<Self, PositionError> {
        if fill_price <= Decimal::ZERO {
            return Err(PositionError::InvalidFill(format!(
                "non-positive fill price {fill_price}"
            )));
        }
        let risk_unit = signal.risk_distance();
        if risk_unit <= Decimal::ZERO {
            return Err(PositionError::InvalidFill(format!(
                "degenerate risk distance {risk_unit}"
            )));
        }
        let side = signal.side;
        let stop = side.offset(fill_price, -risk_unit);
        let target = signal
            .target_distance()
            .map(|distance| side.offset(fill_price, distance));

        Ok(Self {
            id: Uuid::new_v4(),
            signal_id: signal.id,
            instrument: signal.instrument.clone(),
            side,
            strategy: signal.strategy,
            sub_type: signal.sub_type.clone(),
            entry_price: fill_price,
            entry_time: fill_time,
            initial_stop: stop,
            stop,
            target,
            risk_unit,
            risk_cash,
            volume,
            atr_at_entry: signal.atr,
            bars_open: 0,
            favorable_extreme: fill_price,
            adverse_extreme: fill_price,
            last_close: fill_price,
            last_bar_time: None,
            indicators: signal.indicators,
            breakeven_set: false,
            trailing_tier: 0,
            status: PositionStatus::Open,
        })
    }

    /// Risk unit R in price
    pub fn r(&self) -> Decimal {
        self.risk_unit
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, PositionStatus::Open)
    }

    /// Unrealized result in R at `price`
    pub fn r_at(&self, price: Decimal) -> Decimal {
        self.side.favorable_move(self.entry_price, price) / self.risk_unit
    }

    /// Unrealized result in R at the last close
    pub fn current_r(&self) -> Decimal {
        self.r_at(self.last_close)
    }

    /// Maximum favorable excursion in R
    pub fn mfe_r(&self) -> Decimal {
        self.r_at(self.favorable_extreme)
    }

    /// Maximum adverse excursion in R (negative when price went against)
    pub fn mae_r(&self) -> Decimal {
        self.r_at(self.adverse_extreme)
    }

    /// Unrealized cash P&L at `price`
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.r_at(price) * self.risk_cash
    }

    /// True once breakeven or trailing has moved the stop
    pub fn stop_moved(&self) -> bool {
        self.breakeven_set || self.trailing_tier > 0
    }

    /// Reference time for bar ordering
    pub fn last_event_time(&self) -> DateTime<Utc> {
        self.last_bar_time.unwrap_or(self.entry_time)
    }

    pub fn exit_kind(&self) -> Option<ExitKind> {
        match self.status {
            PositionStatus::Closed { kind, .. } => Some(kind),
            PositionStatus::Open => None,
        }
    }

    pub fn exit_price(&self) -> Option<Decimal> {
        match self.status {
            PositionStatus::Closed { exit_price, .. } => Some(exit_price),
            PositionStatus::Open => None,
        }
    }

    /// Realized result in R, for closed positions
    pub fn result_r(&self) -> Option<Decimal> {
        match self.status {
            PositionStatus::Closed { result_r, .. } => Some(result_r),
            PositionStatus::Open => None,
        }
    }

    /// Realized cash P&L, for closed positions
    pub fn realized_pnl(&self) -> Option<Decimal> {
        self.result_r().map(|r| r * self.risk_cash)
    }

    /// Advance bar counter, extremes and context with a new bar
    pub(crate) fn record_bar(&mut self, bar: &Bar, indicators: &IndicatorSnapshot) {
        self.bars_open += 1;
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
        self.last_close = bar.close;
        self.last_bar_time = Some(bar.timestamp);
        self.indicators = *indicators;
    }

    /// Freeze the outcome, returning the result in R
    pub(crate) fn close(
        &mut self,
        kind: ExitKind,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
    ) -> Decimal {
        let result_r = self.r_at(exit_price);
        self.status = PositionStatus::Closed {
            kind,
            exit_price,
            exit_time,
            result_r,
        };
        result_r
    }
}
