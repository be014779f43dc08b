//! prop-engine: decision core for prop-firm style trading accounts
//!
//! This library provides:
//! - Pre-trade guards enforcing daily and total drawdown limits
//! - Risk sizing against the remaining drawdown headroom
//! - A per-position state machine (breakeven, tiered trailing, ROI,
//!   giveback, deadfish and time stops)
//! - Counterfactual tracking of rejected signals and early exits
//! - An append-only decision audit log
//! - A historical simulator and a live driver sharing one decision core

pub mod audit;
pub mod backtest;
pub mod cli;
pub mod config;
pub mod counterfactual;
pub mod decision;
pub mod engine;
pub mod execution;
pub mod feed;
pub mod live;
pub mod position;
pub mod risk;
pub mod signal;
pub mod telemetry;
