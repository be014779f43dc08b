//! Backtest command implementation

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Args;
use rust_decimal::Decimal;
use std::path::PathBuf;

use crate::audit::{AuditSink, JsonlAuditSink, MemoryAuditSink};
use crate::backtest::{BacktestSimulator, EventStream};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct BacktestArgs {
    /// JSONL event files (bars and signals); defaults to `backtest.data`
    pub events: Vec<PathBuf>,

    /// Start time filter (RFC 3339)
    #[arg(long)]
    pub start: Option<String>,

    /// End time filter (RFC 3339)
    #[arg(long)]
    pub end: Option<String>,

    /// Initial capital
    #[arg(long)]
    pub capital: Option<Decimal>,

    /// Audit log path, overriding `audit.path`
    #[arg(long)]
    pub audit: Option<PathBuf>,

    /// Keep the audit log in memory only
    #[arg(long)]
    pub no_audit: bool,

    /// Output format: json or table
    #[arg(long, default_value = "table")]
    pub format: String,
}

impl BacktestArgs {
    pub fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        if let Some(capital) = self.capital {
            config.account.start_balance = capital;
            config.validate()?;
        }

        let paths = if self.events.is_empty() {
            let data = config
                .backtest
                .data
                .clone()
                .context("No event files given and backtest.data is not set")?;
            vec![data]
        } else {
            self.events.clone()
        };
        let events = EventStream::load(paths.as_slice())?
            .window(parse_time(&self.start)?, parse_time(&self.end)?);
        tracing::info!(events = events.len(), files = paths.len(), "Running backtest");

        let audit_path = self.audit.clone().or_else(|| config.audit.path.clone());
        let mut sink: Box<dyn AuditSink> = match audit_path {
            Some(path) if !self.no_audit => Box::new(JsonlAuditSink::open(&path)?),
            _ => Box::new(MemoryAuditSink::new()),
        };

        let result = BacktestSimulator::new(&config, sink.as_mut())?.run(events)?;

        match self.format.as_str() {
            "json" => println!("{}", serde_json::to_string_pretty(&result.summary)?),
            _ => {
                println!("{}", result.summary.format_table());
                println!("{}", result.stats.summary());
            }
        }
        Ok(())
    }
}

fn parse_time(value: &Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    value
        .as_deref()
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("Invalid time filter {s}"))
        })
        .transpose()
}
