//! Backtesting module
//!
//! Replays historical bars and signals through the decision core with
//! simulated execution

mod analytics;
mod execution_model;
mod replay;
mod simulator;

pub use analytics::{BacktestResult, BacktestSummary, EquityPoint};
pub use execution_model::{FillModel, SpreadModel};
pub use replay::{BarEvent, EventStream, MarketEvent};
pub use simulator::BacktestSimulator;

use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::audit::AuditError;
use crate::config::ConfigError;
use crate::feed::FeedError;
use crate::position::PositionError;
use crate::risk::RiskError;

/// Backtest configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Simulated broker spread
    pub spread: SpreadModel,
    /// Adverse entry slippage as a multiple of ATR
    pub slippage_atr: Decimal,
    /// Bars to wait after an entry before the same instrument can trade again
    pub cooldown_bars: u32,
    /// Default JSONL event file
    pub data: Option<PathBuf>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            spread: SpreadModel::default(),
            slippage_atr: Decimal::ZERO,
            cooldown_bars: 0,
            data: None,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slippage_atr < Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "backtest.slippage_atr must not be negative".into(),
            ));
        }
        self.spread.validate()
    }
}

/// Backtest errors
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("Failed to read events: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed event on line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Account(#[from] RiskError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}
