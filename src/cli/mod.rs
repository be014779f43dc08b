//! CLI interface for prop-engine
//!
//! Provides subcommands for:
//! - `backtest`: Replay historical bars and signals through the decision core
//! - `run`: Drive the live engine with the paper gateway
//! - `check-config`: Validate a configuration file

mod backtest;
mod run;

pub use backtest::BacktestArgs;
pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "prop-engine")]
#[command(about = "Drawdown-guarded trade decisions for prop-firm accounts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a backtest over JSONL event files
    Backtest(BacktestArgs),
    /// Run the live engine against a JSONL tick/signal feed
    Run(RunArgs),
    /// Validate the configuration and print the effective limits
    CheckConfig,
}
