//! Prop-firm and execution limits

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Account-level limits imposed by the prop firm, in percent units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropLimits {
    /// Maximum loss below day-start balance (3.0 = 3 %)
    pub max_daily_dd_pct: Decimal,
    /// Maximum loss below session-start balance
    pub max_total_dd_pct: Decimal,
    /// Entries stop this far before the total limit
    pub dd_safety_margin_pct: Decimal,
    /// Risk per trade as percent of session-start balance
    pub risk_per_trade_pct: Decimal,
    /// Concurrent open positions
    pub max_positions: usize,
    /// Cumulative open risk as percent of session-start balance
    pub max_open_risk_pct: Decimal,
    /// Positions opened per day
    pub max_daily_trades: u32,
    /// Scale base risk down with total drawdown
    pub progressive_sizing: bool,
}

impl Default for PropLimits {
    fn default() -> Self {
        Self {
            max_daily_dd_pct: dec!(3.0),
            max_total_dd_pct: dec!(8.0),
            dd_safety_margin_pct: Decimal::ZERO,
            risk_per_trade_pct: dec!(0.5),
            max_positions: 3,
            max_open_risk_pct: dec!(2.0),
            max_daily_trades: 10,
            progressive_sizing: false,
        }
    }
}

impl PropLimits {
    /// Total drawdown at which new entries stop
    pub fn total_dd_pause_pct(&self) -> Decimal {
        self.max_total_dd_pct - self.dd_safety_margin_pct
    }
}

/// Market-condition limits applied at entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecLimits {
    /// Maximum spread as a multiple of ATR
    pub max_spread_atr: Decimal,
    /// Maximum fill deviation from the signal price as a multiple of ATR
    pub max_slippage_atr: Decimal,
    /// Minimum normalized Bollinger band width
    pub min_bb_width: Decimal,
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self {
            max_spread_atr: dec!(0.15),
            max_slippage_atr: dec!(0.10),
            min_bb_width: dec!(0.003),
        }
    }
}
