//! Signal module
//!
//! Read-only trade signals as handed over by the upstream producer

mod types;

pub use types::{IndicatorSnapshot, Side, Signal, SignalError, StrategyKind};
