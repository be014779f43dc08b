//! Simulated broker fills

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::feed::Quote;
use crate::signal::Side;

/// How the simulated spread is derived from the price
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpreadModel {
    /// Constant spread in price units
    Fixed { value: Decimal },
    /// Spread as percent of price (0.01 = 0.01 %)
    Percent { pct: Decimal },
}

impl Default for SpreadModel {
    fn default() -> Self {
        SpreadModel::Percent { pct: dec!(0.01) }
    }
}

impl SpreadModel {
    pub fn spread_at(&self, price: Decimal) -> Decimal {
        match self {
            SpreadModel::Fixed { value } => *value,
            SpreadModel::Percent { pct } => price * pct / dec!(100),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let value = match self {
            SpreadModel::Fixed { value } => *value,
            SpreadModel::Percent { pct } => *pct,
        };
        if value < Decimal::ZERO {
            return Err(ConfigError::Invalid(format!(
                "backtest.spread must not be negative, got {value}"
            )));
        }
        Ok(())
    }
}

/// Next-bar-open fills with spread and ATR slippage
#[derive(Debug, Clone)]
pub struct FillModel {
    spread: SpreadModel,
    slippage_atr: Decimal,
}

impl FillModel {
    pub fn new(spread: SpreadModel, slippage_atr: Decimal) -> Self {
        Self {
            spread,
            slippage_atr,
        }
    }

    /// Broker quote when the bar trades at `price`: bid at price, ask above
    pub fn quote_at(&self, price: Decimal) -> Quote {
        Quote::new(price, price + self.spread.spread_at(price))
    }

    /// Realized entry: the quote side, moved against the trade by slippage
    pub fn entry_fill(&self, side: Side, quote: &Quote, atr: Decimal) -> Decimal {
        let slippage = self.slippage_atr * atr.max(Decimal::ZERO);
        side.offset(quote.fill_for(side), -slippage)
    }
}
