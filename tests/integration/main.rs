//! Integration tests

mod backtest_test;
mod common;
mod config_test;
mod live_test;
mod properties_test;
mod scenario_test;
