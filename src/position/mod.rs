//! Position management
//!
//! Per-position state machine driven one bar at a time, shared unchanged by
//! the backtest and live drivers.

mod config;
mod manager;
mod types;

pub use config::{
    BreakevenConfig, DeadfishConfig, GivebackConfig, ManagerConfig, RoiConfig, RoiTier,
    TimeStopConfig, TrailingTier,
};
pub use manager::{PositionManager, UpdateOutcome};
pub use types::{Position, PositionError, PositionStatus};
