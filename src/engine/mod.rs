//! Decision engine
//!
//! One core, two drivers: the backtest simulator and the live engine both
//! go through `DecisionCore` and nothing else.

mod decision_core;

pub use decision_core::{BarReport, CloseReport, DecisionCore, SignalOutcome};
