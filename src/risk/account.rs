//! Account capital and exposure

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use super::RiskError;

const HUNDRED: Decimal = dec!(100);

/// Capital and exposure of one trading session.
///
/// Drawdown percentages are derived on demand and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: Decimal,
    pub equity: Decimal,
    pub day_start_balance: Decimal,
    pub session_start_balance: Decimal,
    pub open_positions: usize,
    /// Sum of risk cash of all open positions
    pub open_risk_cash: Decimal,
    pub open_instruments: BTreeSet<String>,
    pub trades_today: u32,
}

impl AccountState {
    /// Start a session with `balance` as day-start and session-start reference
    pub fn new(balance: Decimal) -> Result<Self, RiskError> {
        if balance <= Decimal::ZERO {
            return Err(RiskError::InvalidBalance(balance));
        }
        Ok(Self {
            balance,
            equity: balance,
            day_start_balance: balance,
            session_start_balance: balance,
            open_positions: 0,
            open_risk_cash: Decimal::ZERO,
            open_instruments: BTreeSet::new(),
            trades_today: 0,
        })
    }

    /// Equity change from day start in percent, negative in drawdown
    pub fn daily_dd_pct(&self) -> Decimal {
        pct_change(self.day_start_balance, self.equity)
    }

    /// Equity change from session start in percent, negative in drawdown
    pub fn total_dd_pct(&self) -> Decimal {
        pct_change(self.session_start_balance, self.equity)
    }

    pub fn has_open(&self, instrument: &str) -> bool {
        self.open_instruments.contains(instrument)
    }

    /// Record a newly opened position
    pub fn register_open(&mut self, instrument: &str, risk_cash: Decimal) -> Result<(), RiskError> {
        if !self.open_instruments.insert(instrument.to_string()) {
            return Err(RiskError::AlreadyOpen(instrument.to_string()));
        }
        self.open_positions += 1;
        self.open_risk_cash += risk_cash;
        self.trades_today += 1;
        debug!(
            instrument,
            %risk_cash,
            open_positions = self.open_positions,
            "Exposure registered"
        );
        Ok(())
    }

    /// Release exposure and book realized P&L
    pub fn apply_close(
        &mut self,
        instrument: &str,
        risk_cash: Decimal,
        pnl: Decimal,
    ) -> Result<(), RiskError> {
        if !self.open_instruments.remove(instrument) {
            return Err(RiskError::NotOpen(instrument.to_string()));
        }
        self.open_positions = self.open_positions.saturating_sub(1);
        self.open_risk_cash = (self.open_risk_cash - risk_cash).max(Decimal::ZERO);
        self.balance += pnl;
        // Flat book: equity is the balance
        if self.open_positions == 0 {
            self.equity = self.balance;
        } else {
            self.equity += pnl;
        }
        debug!(instrument, %pnl, balance = %self.balance, "Exposure released");
        Ok(())
    }

    /// Mark equity to balance plus unrealized P&L of open positions
    pub fn mark_equity(&mut self, unrealized: Decimal) {
        self.equity = self.balance + unrealized;
    }

    /// Day rollover: new daily reference and trade counter
    pub fn new_day(&mut self) {
        self.day_start_balance = self.balance;
        self.trades_today = 0;
    }
}

fn pct_change(reference: Decimal, value: Decimal) -> Decimal {
    if reference <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (value - reference) / reference * HUNDRED
}
