//! Position lifecycle management
//!
//! Every open position is advanced once per bar through a fixed priority
//! order: ROI ceiling, intrabar stop/target, breakeven, trailing tiers,
//! giveback, deadfish, time-stop. Exits are terminal for the bar.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{ManagerConfig, Position, PositionError};
use crate::counterfactual::Counterfactual;
use crate::decision::{Decision, DecisionKind, ExitKind, Field};
use crate::feed::Bar;
use crate::risk::AccountState;
use crate::signal::{IndicatorSnapshot, Side, Signal};

const RSI_MIRROR: Decimal = dec!(100);

/// Decisions produced by one position update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub position_id: Option<Uuid>,
    pub decisions: Vec<Decision>,
    /// Present when the bar caused a discretionary exit
    pub counterfactual: Option<Counterfactual>,
}

impl UpdateOutcome {
    pub fn exit(&self) -> Option<&Decision> {
        self.decisions.iter().find(|d| d.exit_kind().is_some())
    }
}

/// An exit chosen during a bar step, not yet booked
struct PendingExit {
    kind: ExitKind,
    price: Decimal,
    reason: String,
}

/// Owns open and closed positions
#[derive(Debug, Default)]
pub struct PositionManager {
    config: ManagerConfig,
    open: Vec<Position>,
    closed: Vec<Position>,
}

impl PositionManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            open: Vec::new(),
            closed: Vec::new(),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Register a filled position and its exposure
    pub fn open(
        &mut self,
        signal: &Signal,
        fill_price: Decimal,
        fill_time: DateTime<Utc>,
        risk_cash: Decimal,
        volume: Decimal,
        account: &mut AccountState,
    ) -> Result<(Uuid, Decision), PositionError> {
        let position = Position::from_fill(signal, fill_price, fill_time, risk_cash, volume)?;
        account.register_open(&position.instrument, risk_cash)?;

        info!(
            position_id = %position.id,
            instrument = %position.instrument,
            side = position.side.as_str(),
            entry = %position.entry_price,
            stop = %position.stop,
            target = ?position.target,
            %risk_cash,
            %volume,
            "Position opened"
        );

        let decision = Decision::new(
            DecisionKind::PositionOpened,
            &position.instrument,
            fill_time,
            fill_price,
            format!(
                "fill {} vs signal {}, R={}",
                fill_price,
                signal.price,
                position.r()
            ),
        )
        .with_signal(signal.id)
        .with_position(position.id)
        .with_change(Field::Stop, signal.stop, position.stop);

        let id = position.id;
        self.open.push(position);
        Ok((id, decision))
    }

    /// Advance one position with a new bar.
    ///
    /// Updating an already closed position is a no-op.
    pub fn update(
        &mut self,
        id: Uuid,
        bar: &Bar,
        indicators: &IndicatorSnapshot,
        account: &mut AccountState,
    ) -> Result<UpdateOutcome, PositionError> {
        let Some(idx) = self.open.iter().position(|p| p.id == id) else {
            if self.closed.iter().any(|p| p.id == id) {
                warn!(position_id = %id, "Update on closed position ignored");
                return Ok(UpdateOutcome::default());
            }
            return Err(PositionError::NotFound(id));
        };

        let position = &mut self.open[idx];
        if bar.instrument != position.instrument {
            error!(
                position_id = %id,
                expected = %position.instrument,
                got = %bar.instrument,
                "Bar for wrong instrument"
            );
            return Err(PositionError::InstrumentMismatch {
                expected: position.instrument.clone(),
                got: bar.instrument.clone(),
            });
        }
        let in_order = match position.last_bar_time {
            Some(last) => bar.timestamp > last,
            None => bar.timestamp >= position.entry_time,
        };
        if !in_order {
            let last = position.last_event_time();
            error!(position_id = %id, %last, got = %bar.timestamp, "Out-of-order bar");
            return Err(PositionError::OutOfOrderBar {
                id,
                last,
                got: bar.timestamp,
            });
        }

        position.record_bar(bar, indicators);
        let (mut decisions, exit) = step(&self.config, position, bar);

        let mut outcome = UpdateOutcome {
            position_id: Some(id),
            ..UpdateOutcome::default()
        };
        if let Some(exit) = exit {
            let (decision, counterfactual) =
                self.finish(idx, exit.kind, exit.price, bar.timestamp, exit.reason, account)?;
            decisions.push(decision);
            outcome.counterfactual = counterfactual;
        }
        outcome.decisions = decisions;
        Ok(outcome)
    }

    /// Advance every open position on `bar.instrument`.
    ///
    /// Positions filled after the bar started are left for the next bar.
    pub fn update_instrument(
        &mut self,
        bar: &Bar,
        indicators: &IndicatorSnapshot,
        account: &mut AccountState,
    ) -> Result<Vec<UpdateOutcome>, PositionError> {
        let ids: Vec<Uuid> = self
            .open
            .iter()
            .filter(|p| p.instrument == bar.instrument)
            .filter(|p| {
                let started = p.entry_time <= bar.timestamp;
                if !started {
                    debug!(position_id = %p.id, bar = %bar.timestamp, "Bar predates fill, skipped");
                }
                started
            })
            .map(|p| p.id)
            .collect();
        ids.into_iter()
            .map(|id| self.update(id, bar, indicators, account))
            .collect()
    }

    /// Close a position outside the bar cycle (manual, end of data)
    pub fn close(
        &mut self,
        id: Uuid,
        kind: ExitKind,
        price: Decimal,
        time: DateTime<Utc>,
        account: &mut AccountState,
    ) -> Result<(Decision, Option<Counterfactual>), PositionError> {
        let Some(idx) = self.open.iter().position(|p| p.id == id) else {
            if self.closed.iter().any(|p| p.id == id) {
                error!(position_id = %id, "Close requested on closed position");
                return Err(PositionError::AlreadyClosed(id));
            }
            return Err(PositionError::NotFound(id));
        };
        let reason = format!("{} @ {}", kind, price);
        self.finish(idx, kind, price, time, reason, account)
    }

    fn finish(
        &mut self,
        idx: usize,
        kind: ExitKind,
        price: Decimal,
        time: DateTime<Utc>,
        reason: String,
        account: &mut AccountState,
    ) -> Result<(Decision, Option<Counterfactual>), PositionError> {
        let mut position = self.open.remove(idx);
        let result_r = position.close(kind, price, time);
        let pnl = result_r * position.risk_cash;
        let balance_before = account.balance;
        if let Err(e) = account.apply_close(&position.instrument, position.risk_cash, pnl) {
            error!(position_id = %position.id, error = %e, "Account out of sync on close");
            self.closed.push(position);
            return Err(e.into());
        }

        info!(
            position_id = %position.id,
            instrument = %position.instrument,
            exit = kind.code(),
            %price,
            result_r = %result_r.round_dp(3),
            %pnl,
            bars = position.bars_open,
            "Position closed"
        );

        let decision = Decision::new(
            DecisionKind::Exit { kind },
            &position.instrument,
            time,
            price,
            reason,
        )
        .with_signal(position.signal_id)
        .with_position(position.id)
        .with_change(Field::Balance, balance_before, account.balance)
        .with_result(result_r);

        let counterfactual = kind
            .is_discretionary()
            .then(|| Counterfactual::for_early_exit(&position, kind, price, time));

        self.closed.push(position);
        Ok((decision, counterfactual))
    }

    pub fn get(&self, id: Uuid) -> Option<&Position> {
        self.open
            .iter()
            .chain(self.closed.iter())
            .find(|p| p.id == id)
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.open
    }

    pub fn closed_positions(&self) -> &[Position] {
        &self.closed
    }

    /// Hand over closed positions, forgetting them.
    ///
    /// Ids drained here are no longer known to `update` or `close`.
    pub fn drain_closed(&mut self) -> Vec<Position> {
        std::mem::take(&mut self.closed)
    }

    /// Unrealized P&L of all open positions at their last close
    pub fn unrealized_pnl(&self) -> Decimal {
        self.open
            .iter()
            .map(|p| p.unrealized_pnl(p.last_close))
            .sum()
    }
}

/// One bar of the exit policy on an open position whose bar has already been
/// recorded
fn step(
    config: &ManagerConfig,
    position: &mut Position,
    bar: &Bar,
) -> (Vec<Decision>, Option<PendingExit>) {
    if let Some(exit) = check_intrabar(config, position, bar) {
        return (Vec::new(), Some(exit));
    }

    let mut decisions = Vec::new();
    decisions.extend(update_breakeven(config, position, bar));
    decisions.extend(update_trailing(config, position, bar));

    let exit = check_giveback(config, position)
        .or_else(|| check_deadfish(config, position))
        .or_else(|| check_time_stop(config, position));
    (decisions, exit)
}

/// Target for this bar: the more permissive of the stored target and the
/// current ROI step. Second value is true when ROI lowered it.
fn effective_target(config: &ManagerConfig, position: &Position) -> (Option<Decimal>, bool) {
    let roi_target = config.roi_tier_for(position.bars_open).map(|tier| {
        position
            .side
            .offset(position.entry_price, tier.min_profit_r * position.r())
    });
    match (position.target, roi_target) {
        (Some(target), Some(roi)) if position.side.is_better(target, roi) => (Some(roi), true),
        (None, Some(roi)) => (Some(roi), true),
        (target, _) => (target, false),
    }
}

fn check_intrabar(config: &ManagerConfig, position: &Position, bar: &Bar) -> Option<PendingExit> {
    let side = position.side;
    let (best, worst) = match side {
        Side::Long => (bar.high, bar.low),
        Side::Short => (bar.low, bar.high),
    };

    // Conservative: a stop touched in the bar wins over any target
    if !side.is_better(worst, position.stop) {
        let (kind, label) = if position.stop_moved() {
            (ExitKind::TrailingStop, "trailing stop")
        } else {
            (ExitKind::StopLoss, "stop loss")
        };
        return Some(PendingExit {
            kind,
            price: position.stop,
            reason: format!(
                "{} hit @ {} (tier {}, MFE {}R)",
                label,
                position.stop,
                position.trailing_tier,
                position.mfe_r().round_dp(2)
            ),
        });
    }

    let (target, roi_lowered) = effective_target(config, position);
    let target = target?;
    if side.is_better(target, best) {
        return None;
    }
    let original_hit = position
        .target
        .is_some_and(|original| !side.is_better(original, best));
    let kind = if roi_lowered && !original_hit {
        ExitKind::Roi
    } else {
        ExitKind::TakeProfit
    };
    Some(PendingExit {
        kind,
        price: target,
        reason: format!(
            "{} hit @ {} after {} bars",
            kind, target, position.bars_open
        ),
    })
}

fn update_breakeven(
    config: &ManagerConfig,
    position: &mut Position,
    bar: &Bar,
) -> Option<Decision> {
    let be = &config.breakeven;
    if !be.enabled || position.breakeven_set || position.mfe_r() < be.trigger_r {
        return None;
    }
    let level = position
        .side
        .offset(position.entry_price, be.offset_r * position.r());
    if !position.side.is_better(level, position.stop) {
        return None;
    }

    let before = position.stop;
    position.stop = level;
    position.breakeven_set = true;
    debug!(position_id = %position.id, %before, after = %level, "Stop to breakeven");

    Some(
        Decision::new(
            DecisionKind::Breakeven,
            &position.instrument,
            bar.timestamp,
            bar.close,
            format!("breakeven at MFE {}R", position.mfe_r().round_dp(2)),
        )
        .with_signal(position.signal_id)
        .with_position(position.id)
        .with_change(Field::Stop, before, level),
    )
}

fn update_trailing(
    config: &ManagerConfig,
    position: &mut Position,
    bar: &Bar,
) -> Option<Decision> {
    let mfe_r = position.mfe_r();
    let (tier_no, tier) = config.trailing_tier_for(mfe_r)?;
    let candidate = position
        .side
        .offset(position.favorable_extreme, -(tier.trail_r * position.r()));
    if !position.side.is_better(candidate, position.stop) {
        return None;
    }

    let before = position.stop;
    let old_tier = position.trailing_tier;
    position.stop = candidate;
    position.trailing_tier = old_tier.max(tier_no);
    debug!(
        position_id = %position.id,
        tier = position.trailing_tier,
        %before,
        after = %candidate,
        "Trailing stop moved"
    );

    let kind = if old_tier == 0 {
        DecisionKind::TrailingActivated {
            tier: position.trailing_tier,
        }
    } else {
        DecisionKind::TrailingTightened {
            tier: position.trailing_tier,
        }
    };
    let mut decision = Decision::new(
        kind,
        &position.instrument,
        bar.timestamp,
        bar.close,
        format!(
            "tier {}: MFE {}R, trail {}R",
            position.trailing_tier,
            mfe_r.round_dp(2),
            tier.trail_r
        ),
    )
    .with_signal(position.signal_id)
    .with_position(position.id)
    .with_change(Field::Stop, before, candidate);
    if position.trailing_tier != old_tier {
        decision = decision.with_change(
            Field::TrailingTier,
            Decimal::from(old_tier),
            Decimal::from(position.trailing_tier),
        );
    }
    Some(decision)
}

/// RSI and CMF both confirm momentum fading against the position
fn momentum_weak(config: &ManagerConfig, position: &Position) -> bool {
    let gb = &config.giveback;
    let ind = &position.indicators;
    match position.side {
        Side::Long => ind.rsi < gb.rsi_threshold && ind.cmf < gb.cmf_threshold,
        Side::Short => ind.rsi > RSI_MIRROR - gb.rsi_threshold && ind.cmf > -gb.cmf_threshold,
    }
}

fn check_giveback(config: &ManagerConfig, position: &Position) -> Option<PendingExit> {
    let gb = &config.giveback;
    if !gb.enabled
        || position.mfe_r() < gb.mfe_min_r
        || position.current_r() > gb.current_max_r
        || !momentum_weak(config, position)
    {
        return None;
    }
    Some(PendingExit {
        kind: ExitKind::Giveback,
        price: position.last_close,
        reason: format!(
            "giveback: MFE {}R, now {}R, RSI {}, CMF {}",
            position.mfe_r().round_dp(2),
            position.current_r().round_dp(2),
            position.indicators.rsi.round_dp(0),
            position.indicators.cmf.round_dp(3)
        ),
    })
}

fn check_deadfish(config: &ManagerConfig, position: &Position) -> Option<PendingExit> {
    let df = &config.deadfish;
    if !df.enabled
        || position.bars_open < df.min_bars
        || position.mfe_r() >= df.mfe_floor_r
        || position.current_r() > df.current_max_r
        || position.indicators.bb_width >= df.bb_width_threshold
    {
        return None;
    }
    Some(PendingExit {
        kind: ExitKind::Deadfish,
        price: position.last_close,
        reason: format!(
            "deadfish: {} bars, MFE {}R, bb width {}",
            position.bars_open,
            position.mfe_r().round_dp(2),
            position.indicators.bb_width
        ),
    })
}

fn check_time_stop(config: &ManagerConfig, position: &Position) -> Option<PendingExit> {
    if position.bars_open < config.time_stop.max_bars {
        return None;
    }
    Some(PendingExit {
        kind: ExitKind::TimeStop,
        price: position.last_close,
        reason: format!(
            "time stop: {} bars, now {}R",
            position.bars_open,
            position.current_r().round_dp(2)
        ),
    })
}
