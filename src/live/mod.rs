//! Live trading driver
//!
//! Feeds broker ticks through a tick-to-bar aggregator into the shared
//! decision core and routes the resulting orders to an execution gateway.

mod engine;
mod types;

pub use engine::LiveEngine;
pub use types::{FeedMessage, LiveReport};

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::config::ConfigError;

/// Live driver configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Bar period built from ticks
    pub bar_period_secs: u64,
    /// Capacity of the tick and signal channels
    pub channel_capacity: usize,
    /// Close open positions when the feed ends
    pub close_on_shutdown: bool,
    /// Adverse price offset applied by the paper gateway
    pub paper_slippage: Decimal,
    /// Paper gateway fee per lot
    pub paper_fee_per_lot: Decimal,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            bar_period_secs: 3600,
            channel_capacity: 1024,
            close_on_shutdown: true,
            paper_slippage: Decimal::ZERO,
            paper_fee_per_lot: Decimal::ZERO,
        }
    }
}

impl LiveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bar_period_secs == 0 {
            return Err(ConfigError::Invalid("live.bar_period_secs must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("live.channel_capacity must be positive".into()));
        }
        if self.paper_slippage < Decimal::ZERO || self.paper_fee_per_lot < Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "live paper slippage and fees must not be negative".into(),
            ));
        }
        Ok(())
    }
}
