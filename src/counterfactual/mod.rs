//! Counterfactual tracking
//!
//! "What would have happened" for rejected signals and discretionary exits,
//! resolved against real subsequent bars. Used for calibration reporting
//! only, never for decisions.

mod tracker;
mod types;

pub use tracker::{CounterfactualConfig, CounterfactualTracker};
pub use types::{Counterfactual, CounterfactualOrigin, Outcome, Resolution, Verdict};
