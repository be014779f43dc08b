//! Risk management module
//!
//! Account state, prop-firm limits, entry guards and position sizing

mod account;
mod guards;
mod limits;
mod sizing;
mod types;

pub use account::AccountState;
pub use guards::{Approval, GuardOutcome, Guards, Rejection};
pub use limits::{ExecLimits, PropLimits};
pub use sizing::{RiskSizer, Sizing};
pub use types::RiskError;
