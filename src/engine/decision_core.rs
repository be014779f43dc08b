//! The decision core shared by the backtest and live drivers.
//!
//! Synchronous and I/O-free: every call completes in bounded time and
//! returns the decisions it made. Persisting them and talking to a broker is
//! the caller's job.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AccountConfig, Config};
use crate::counterfactual::{Counterfactual, CounterfactualTracker};
use crate::decision::{Decision, DecisionKind, ExitKind, RejectReason};
use crate::feed::{Bar, Quote};
use crate::position::{Position, PositionError, PositionManager};
use crate::risk::{AccountState, Approval, GuardOutcome, Guards, RiskError, RiskSizer};
use crate::signal::{IndicatorSnapshot, Signal};
use crate::telemetry;

/// Result of evaluating one signal
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    Accepted {
        decision: Decision,
        approval: Approval,
        /// Broker volume for the approved risk
        volume: Decimal,
    },
    Rejected {
        decision: Decision,
        reason: RejectReason,
        /// What-if tracked for this rejection, if it had a usable stop
        counterfactual: Option<Counterfactual>,
    },
}

impl SignalOutcome {
    pub fn decision(&self) -> &Decision {
        match self {
            SignalOutcome::Accepted { decision, .. } | SignalOutcome::Rejected { decision, .. } => {
                decision
            }
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, SignalOutcome::Accepted { .. })
    }
}

/// Everything one bar produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarReport {
    pub decisions: Vec<Decision>,
    /// Early-exit counterfactuals created on this bar
    pub created: Vec<Counterfactual>,
    /// Counterfactuals resolved by this bar
    pub resolved: Vec<Counterfactual>,
    /// Positions closed on this bar
    pub closed: Vec<Uuid>,
}

/// A position closed outside the bar cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CloseReport {
    pub position_id: Uuid,
    pub decision: Decision,
    pub counterfactual: Option<Counterfactual>,
}

/// Guards, sizing, position manager, counterfactuals and account state behind
/// one serialized interface
#[derive(Debug)]
pub struct DecisionCore {
    guards: Guards,
    manager: PositionManager,
    tracker: CounterfactualTracker,
    account: AccountState,
    contract: AccountConfig,
    trading_day: Option<NaiveDate>,
}

impl DecisionCore {
    pub fn new(config: &Config) -> Result<Self, RiskError> {
        Ok(Self {
            guards: Guards::new(config.prop.clone(), config.execution.clone()),
            manager: PositionManager::new(config.manager.clone()),
            tracker: CounterfactualTracker::new(config.counterfactual.clone()),
            account: AccountState::new(config.account.start_balance)?,
            contract: config.account.clone(),
            trading_day: None,
        })
    }

    /// Run the guards and sizing on `signal` against the current quote
    pub fn evaluate_signal(&mut self, signal: &Signal, quote: &Quote) -> SignalOutcome {
        let outcome = match self.guards.evaluate(signal, &self.account, quote) {
            GuardOutcome::Accepted { approval, decision } => {
                let volume = RiskSizer::volume(
                    approval.sizing.risk_cash,
                    approval.sizing.risk_distance,
                    self.contract.contract_size,
                    self.contract.lot_step,
                );
                if volume > Decimal::ZERO {
                    SignalOutcome::Accepted {
                        decision,
                        approval,
                        volume,
                    }
                } else {
                    info!(
                        instrument = %signal.instrument,
                        risk_cash = %approval.sizing.risk_cash,
                        "Signal rejected: volume below lot step"
                    );
                    let decision = Decision::new(
                        DecisionKind::SignalRejected {
                            reason: RejectReason::ZeroSize,
                        },
                        &signal.instrument,
                        signal.timestamp,
                        approval.fill_estimate,
                        format!(
                            "risk {} below one lot step of {}",
                            approval.sizing.risk_cash, self.contract.lot_step
                        ),
                    )
                    .with_signal(signal.id)
                    .with_spread(approval.spread);
                    self.rejected(signal, decision, RejectReason::ZeroSize)
                }
            }
            GuardOutcome::Rejected {
                rejection,
                decision,
            } => self.rejected(signal, decision, rejection.reason),
        };

        telemetry::record_signal(outcome.is_accepted());
        if let SignalOutcome::Rejected { reason, .. } = &outcome {
            telemetry::record_rejection(*reason);
        }
        outcome
    }

    fn rejected(&mut self, signal: &Signal, decision: Decision, reason: RejectReason) -> SignalOutcome {
        // Invalid input has no meaningful hypothetical trade
        let counterfactual = if reason == RejectReason::InvalidSignal {
            None
        } else {
            Counterfactual::for_rejection(signal, reason, decision.price)
        };
        if let Some(cf) = &counterfactual {
            self.tracker.track(cf.clone());
        }
        SignalOutcome::Rejected {
            decision,
            reason,
            counterfactual,
        }
    }

    /// Register a realized fill for an accepted signal
    pub fn open_position(
        &mut self,
        signal: &Signal,
        fill_price: Decimal,
        fill_time: DateTime<Utc>,
        risk_cash: Decimal,
        volume: Decimal,
    ) -> Result<(Uuid, Decision), PositionError> {
        let opened = self.manager.open(
            signal,
            fill_price,
            fill_time,
            risk_cash,
            volume,
            &mut self.account,
        )?;
        telemetry::record_account(&self.account);
        Ok(opened)
    }

    /// Advance positions, then counterfactuals, on `bar.instrument`
    pub fn on_bar(
        &mut self,
        bar: &Bar,
        indicators: &IndicatorSnapshot,
    ) -> Result<BarReport, PositionError> {
        self.roll_day(bar.timestamp);

        let mut report = BarReport::default();
        for outcome in self
            .manager
            .update_instrument(bar, indicators, &mut self.account)?
        {
            if let Some(kind) = outcome.exit().and_then(|d| d.exit_kind()) {
                telemetry::record_exit(kind);
                report.closed.extend(outcome.position_id);
            }
            report.decisions.extend(outcome.decisions);
            if let Some(cf) = outcome.counterfactual {
                self.tracker.track(cf.clone());
                report.created.push(cf);
            }
        }
        report.resolved = self.tracker.on_bar(bar);

        self.account.mark_equity(self.manager.unrealized_pnl());
        telemetry::record_account(&self.account);
        Ok(report)
    }

    /// Close one position outside the bar cycle
    pub fn close_position(
        &mut self,
        id: Uuid,
        kind: ExitKind,
        price: Decimal,
        time: DateTime<Utc>,
    ) -> Result<CloseReport, PositionError> {
        let (decision, counterfactual) =
            self.manager.close(id, kind, price, time, &mut self.account)?;
        telemetry::record_exit(kind);
        if let Some(cf) = &counterfactual {
            self.tracker.track(cf.clone());
        }
        self.account.mark_equity(self.manager.unrealized_pnl());
        telemetry::record_account(&self.account);
        Ok(CloseReport {
            position_id: id,
            decision,
            counterfactual,
        })
    }

    /// Close every open position at its instrument's price in `prices`,
    /// falling back to the position's last close
    pub fn close_all(
        &mut self,
        prices: &HashMap<String, Decimal>,
        kind: ExitKind,
        time: DateTime<Utc>,
    ) -> Result<Vec<CloseReport>, PositionError> {
        let targets: Vec<(Uuid, Decimal)> = self
            .manager
            .open_positions()
            .iter()
            .map(|p| {
                let price = prices.get(&p.instrument).copied().unwrap_or(p.last_close);
                (p.id, price)
            })
            .collect();
        if !targets.is_empty() {
            warn!(count = targets.len(), exit = kind.code(), "Closing all positions");
        }
        targets
            .into_iter()
            .map(|(id, price)| self.close_position(id, kind, price, time))
            .collect()
    }

    /// Start a new trading day if `time` falls on a later date.
    ///
    /// Returns true when a rollover happened.
    pub fn roll_day(&mut self, time: DateTime<Utc>) -> bool {
        let date = time.date_naive();
        match self.trading_day {
            Some(day) if date <= day => false,
            Some(_) => {
                self.new_day(date);
                true
            }
            None => {
                self.trading_day = Some(date);
                false
            }
        }
    }

    /// Explicit day rollover: new daily reference balance and trade counter
    pub fn new_day(&mut self, date: NaiveDate) {
        self.account.new_day();
        self.trading_day = Some(date);
        info!(
            %date,
            balance = %self.account.balance,
            total_dd_pct = %self.account.total_dd_pct().round_dp(2),
            "New trading day"
        );
    }

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    pub fn manager(&self) -> &PositionManager {
        &self.manager
    }

    pub fn tracker(&self) -> &CounterfactualTracker {
        &self.tracker
    }

    pub fn open_positions(&self) -> &[Position] {
        self.manager.open_positions()
    }

    pub fn closed_positions(&self) -> &[Position] {
        self.manager.closed_positions()
    }

    /// Take closed positions and resolved counterfactuals out of the core.
    ///
    /// Long-running drivers call this once the records are audited.
    pub fn drain_history(&mut self) -> (Vec<Position>, Vec<Counterfactual>) {
        (self.manager.drain_closed(), self.tracker.drain_resolved())
    }

    pub fn has_open(&self, instrument: &str) -> bool {
        self.account.has_open(instrument)
    }
}
