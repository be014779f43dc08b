//! Risk-based position sizing
//!
//! Base risk is a flat percentage of the session-start balance, capped so a
//! single new position can never consume more than half of the remaining
//! daily drawdown budget or 30 % of the remaining total budget.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

use super::{AccountState, PropLimits};
use crate::signal::Signal;

const HUNDRED: Decimal = dec!(100);
/// Share of remaining daily headroom one position may use
const DAILY_HEADROOM_SHARE: Decimal = dec!(0.5);
/// Share of remaining total headroom one position may use
const TOTAL_HEADROOM_SHARE: Decimal = dec!(0.3);
/// Progressive sizing never scales below this fraction of base risk
const PROGRESSIVE_FLOOR: Decimal = dec!(0.10);

/// Result of a sizing computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sizing {
    /// Cash lost if the stop is hit
    pub risk_cash: Decimal,
    /// |entry - stop|
    pub risk_distance: Decimal,
    /// Flat risk before caps
    pub base_risk: Decimal,
    pub remaining_daily: Decimal,
    pub remaining_total: Decimal,
}

impl Sizing {
    /// False when no order may be placed
    pub fn is_tradeable(&self) -> bool {
        self.risk_cash > Decimal::ZERO && self.risk_distance > Decimal::ZERO
    }
}

/// Computes risk cash and volume
#[derive(Debug, Clone)]
pub struct RiskSizer {
    limits: PropLimits,
}

impl RiskSizer {
    pub fn new(limits: PropLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &PropLimits {
        &self.limits
    }

    /// Risk cash for `signal` under the current account state
    pub fn compute(&self, signal: &Signal, account: &AccountState) -> Sizing {
        let risk_distance = signal.risk_distance();

        let mut base_risk =
            account.session_start_balance * self.limits.risk_per_trade_pct / HUNDRED;
        if self.limits.progressive_sizing {
            base_risk *= self.progressive_ratio(account.total_dd_pct());
        }

        let remaining_daily = ((self.limits.max_daily_dd_pct + account.daily_dd_pct()) / HUNDRED
            * account.day_start_balance)
            .max(Decimal::ZERO);
        let remaining_total = ((self.limits.max_total_dd_pct + account.total_dd_pct()) / HUNDRED
            * account.session_start_balance)
            .max(Decimal::ZERO);

        let risk_cash = base_risk
            .min(remaining_daily * DAILY_HEADROOM_SHARE)
            .min(remaining_total * TOTAL_HEADROOM_SHARE)
            .max(Decimal::ZERO)
            .round_dp_with_strategy(2, RoundingStrategy::ToZero);

        Sizing {
            risk_cash,
            risk_distance,
            base_risk,
            remaining_daily,
            remaining_total,
        }
    }

    /// Linear scale from 1.0 at no drawdown to the floor at the pause threshold
    fn progressive_ratio(&self, total_dd_pct: Decimal) -> Decimal {
        let pause = self.limits.total_dd_pause_pct();
        if total_dd_pct >= Decimal::ZERO || pause <= Decimal::ZERO {
            return Decimal::ONE;
        }
        let used = (-total_dd_pct / pause).min(Decimal::ONE);
        (Decimal::ONE - used * (Decimal::ONE - PROGRESSIVE_FLOOR)).max(PROGRESSIVE_FLOOR)
    }

    /// Volume such that a stop-out loses `risk_cash`, truncated to `lot_step`
    pub fn volume(
        risk_cash: Decimal,
        risk_distance: Decimal,
        contract_size: Decimal,
        lot_step: Decimal,
    ) -> Decimal {
        if risk_cash <= Decimal::ZERO
            || risk_distance <= Decimal::ZERO
            || contract_size <= Decimal::ZERO
            || lot_step <= Decimal::ZERO
        {
            return Decimal::ZERO;
        }
        let raw = risk_cash / (risk_distance * contract_size);
        (raw / lot_step).trunc() * lot_step
    }
}
