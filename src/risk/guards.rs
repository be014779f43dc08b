//! Entry guards
//!
//! An ordered battery of independent checks run against every signal. The
//! first failing check names the rejection; later checks are not evaluated.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info};

use super::{AccountState, ExecLimits, PropLimits, RiskSizer, Sizing};
use crate::decision::{Decision, DecisionKind, RejectReason};
use crate::feed::Quote;
use crate::signal::Signal;

const HUNDRED: Decimal = dec!(100);

/// A failed check
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

impl Rejection {
    fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// Entry allowed, with its estimated fill and capped size
#[derive(Debug, Clone, PartialEq)]
pub struct Approval {
    pub fill_estimate: Decimal,
    pub spread: Decimal,
    pub sizing: Sizing,
}

/// Result of running the guards on one signal
#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutcome {
    Accepted {
        approval: Approval,
        decision: Decision,
    },
    Rejected {
        rejection: Rejection,
        decision: Decision,
    },
}

impl GuardOutcome {
    pub fn decision(&self) -> &Decision {
        match self {
            GuardOutcome::Accepted { decision, .. } | GuardOutcome::Rejected { decision, .. } => {
                decision
            }
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, GuardOutcome::Accepted { .. })
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            GuardOutcome::Rejected { rejection, .. } => Some(rejection.reason),
            GuardOutcome::Accepted { .. } => None,
        }
    }
}

/// Stateless rule evaluator
#[derive(Debug, Clone)]
pub struct Guards {
    prop: PropLimits,
    exec: ExecLimits,
    sizer: RiskSizer,
}

impl Guards {
    pub fn new(prop: PropLimits, exec: ExecLimits) -> Self {
        let sizer = RiskSizer::new(prop.clone());
        Self { prop, exec, sizer }
    }

    pub fn sizer(&self) -> &RiskSizer {
        &self.sizer
    }

    /// Evaluate `signal` against the account and the quote at decision time
    pub fn evaluate(&self, signal: &Signal, account: &AccountState, quote: &Quote) -> GuardOutcome {
        let fill_estimate = quote.fill_for(signal.side);
        let spread = quote.spread();

        let result = self.run_checks(signal, account, quote, fill_estimate).and_then(|()| {
            let sizing = self.sizer.compute(signal, account);
            if sizing.is_tradeable() {
                Ok(sizing)
            } else {
                Err(Rejection::new(
                    RejectReason::ZeroSize,
                    format!(
                        "risk cash {} over distance {}",
                        sizing.risk_cash, sizing.risk_distance
                    ),
                ))
            }
        });

        match result {
            Ok(sizing) => {
                info!(
                    instrument = %signal.instrument,
                    side = signal.side.as_str(),
                    %fill_estimate,
                    risk_cash = %sizing.risk_cash,
                    "Signal accepted"
                );
                let decision = Decision::new(
                    DecisionKind::SignalAccepted,
                    &signal.instrument,
                    signal.timestamp,
                    fill_estimate,
                    format!("risk {} over {}", sizing.risk_cash, sizing.risk_distance),
                )
                .with_signal(signal.id)
                .with_spread(spread);
                GuardOutcome::Accepted {
                    approval: Approval {
                        fill_estimate,
                        spread,
                        sizing,
                    },
                    decision,
                }
            }
            Err(rejection) => {
                info!(
                    instrument = %signal.instrument,
                    reason = rejection.reason.code(),
                    detail = %rejection.detail,
                    "Signal rejected"
                );
                let decision = Decision::new(
                    DecisionKind::SignalRejected {
                        reason: rejection.reason,
                    },
                    &signal.instrument,
                    signal.timestamp,
                    fill_estimate,
                    rejection.detail.clone(),
                )
                .with_signal(signal.id)
                .with_spread(spread);
                GuardOutcome::Rejected {
                    rejection,
                    decision,
                }
            }
        }
    }

    fn run_checks(
        &self,
        signal: &Signal,
        account: &AccountState,
        quote: &Quote,
        fill_estimate: Decimal,
    ) -> Result<(), Rejection> {
        self.check_signal(signal, quote)?;
        self.check_daily_drawdown(account)?;
        self.check_total_drawdown(account)?;
        self.check_positions(account)?;
        self.check_daily_trades(account)?;
        self.check_duplicate(signal, account)?;
        self.check_volatility(signal)?;
        self.check_spread(signal, quote)?;
        self.check_slippage(signal, fill_estimate)?;
        debug!(instrument = %signal.instrument, "All guards passed");
        Ok(())
    }

    fn check_signal(&self, signal: &Signal, quote: &Quote) -> Result<(), Rejection> {
        signal
            .validate()
            .map_err(|e| Rejection::new(RejectReason::InvalidSignal, e.to_string()))?;
        quote
            .validate()
            .map_err(|e| Rejection::new(RejectReason::InvalidSignal, e.to_string()))
    }

    fn check_daily_drawdown(&self, account: &AccountState) -> Result<(), Rejection> {
        let daily = account.daily_dd_pct();
        if daily <= -self.prop.max_daily_dd_pct {
            return Err(Rejection::new(
                RejectReason::DailyDrawdown,
                format!(
                    "daily DD {}% at limit {}%",
                    daily.round_dp(2),
                    self.prop.max_daily_dd_pct
                ),
            ));
        }
        Ok(())
    }

    fn check_total_drawdown(&self, account: &AccountState) -> Result<(), Rejection> {
        let total = account.total_dd_pct();
        let pause = self.prop.total_dd_pause_pct();
        if total <= -pause {
            return Err(Rejection::new(
                RejectReason::TotalDrawdown,
                format!("total DD {}% at limit {}%", total.round_dp(2), pause),
            ));
        }
        Ok(())
    }

    fn check_positions(&self, account: &AccountState) -> Result<(), Rejection> {
        if account.open_positions >= self.prop.max_positions {
            return Err(Rejection::new(
                RejectReason::MaxPositions,
                format!(
                    "{}/{} positions open",
                    account.open_positions, self.prop.max_positions
                ),
            ));
        }
        let max_open_risk =
            account.session_start_balance * self.prop.max_open_risk_pct / HUNDRED;
        if account.open_risk_cash >= max_open_risk {
            return Err(Rejection::new(
                RejectReason::OpenRiskLimit,
                format!(
                    "open risk {} at limit {}",
                    account.open_risk_cash, max_open_risk
                ),
            ));
        }
        Ok(())
    }

    fn check_daily_trades(&self, account: &AccountState) -> Result<(), Rejection> {
        if account.trades_today >= self.prop.max_daily_trades {
            return Err(Rejection::new(
                RejectReason::MaxDailyTrades,
                format!(
                    "{}/{} trades today",
                    account.trades_today, self.prop.max_daily_trades
                ),
            ));
        }
        Ok(())
    }

    fn check_duplicate(&self, signal: &Signal, account: &AccountState) -> Result<(), Rejection> {
        if account.has_open(&signal.instrument) {
            return Err(Rejection::new(
                RejectReason::DuplicateInstrument,
                format!("{} already open", signal.instrument),
            ));
        }
        Ok(())
    }

    fn check_volatility(&self, signal: &Signal) -> Result<(), Rejection> {
        let bb_width = signal.indicators.bb_width;
        if bb_width < self.exec.min_bb_width {
            return Err(Rejection::new(
                RejectReason::VolatilitySqueeze,
                format!("bb width {} below {}", bb_width, self.exec.min_bb_width),
            ));
        }
        Ok(())
    }

    fn check_spread(&self, signal: &Signal, quote: &Quote) -> Result<(), Rejection> {
        if signal.atr <= Decimal::ZERO {
            return Ok(());
        }
        let ratio = quote.spread() / signal.atr;
        if ratio > self.exec.max_spread_atr {
            return Err(Rejection::new(
                RejectReason::SpreadTooWide,
                format!(
                    "spread {} ATR above {}",
                    ratio.round_dp(4),
                    self.exec.max_spread_atr
                ),
            ));
        }
        Ok(())
    }

    fn check_slippage(&self, signal: &Signal, fill_estimate: Decimal) -> Result<(), Rejection> {
        if signal.atr <= Decimal::ZERO {
            return Ok(());
        }
        let ratio = (fill_estimate - signal.price).abs() / signal.atr;
        if ratio > self.exec.max_slippage_atr {
            return Err(Rejection::new(
                RejectReason::SlippageTooHigh,
                format!(
                    "slippage {} ATR above {}",
                    ratio.round_dp(4),
                    self.exec.max_slippage_atr
                ),
            ));
        }
        Ok(())
    }
}
