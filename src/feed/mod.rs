//! Market data module
//!
//! Bars, quotes and ticks consumed by the decision core, plus the
//! tick-to-bar aggregator used by the live driver

mod aggregator;
mod types;

pub use aggregator::BarAggregator;
pub use types::{Bar, FeedError, PriceTick, Quote};
