//! Live driver messages and counters

use serde::{Deserialize, Serialize};

use crate::audit::AuditStats;
use crate::feed::PriceTick;
use crate::signal::IndicatorSnapshot;

/// Market data arriving on the feed channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedMessage {
    Tick(PriceTick),
    /// Indicator values for the bar currently being built
    Indicators {
        instrument: String,
        indicators: IndicatorSnapshot,
    },
}

/// Counters for one live session
#[derive(Debug, Clone, Default, Serialize)]
pub struct LiveReport {
    pub ticks: u64,
    pub bad_ticks: u64,
    pub bars: u64,
    pub signals: u64,
    pub orders: u64,
    pub broker_errors: u64,
    pub stats: AuditStats,
}
