//! Run command implementation

use anyhow::Context;
use clap::Args;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::audit::{AuditSink, JsonlAuditSink, MemoryAuditSink};
use crate::config::Config;
use crate::execution::PaperGateway;
use crate::feed::PriceTick;
use crate::live::{FeedMessage, LiveEngine};
use crate::signal::{IndicatorSnapshot, Signal};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSONL feed of ticks, indicators and signals; stdin when absent
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Audit log path, overriding `audit.path`
    #[arg(long)]
    pub audit: Option<PathBuf>,
}

/// One line of the live input feed
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum InputLine {
    Tick(PriceTick),
    Indicators {
        instrument: String,
        indicators: IndicatorSnapshot,
    },
    Signal(Signal),
}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let gateway = Arc::new(PaperGateway::new(
            config.live.paper_slippage,
            config.live.paper_fee_per_lot,
        ));
        let audit: Box<dyn AuditSink> = match self.audit.clone().or_else(|| config.audit.path.clone()) {
            Some(path) => Box::new(JsonlAuditSink::open(&path)?),
            None => Box::new(MemoryAuditSink::new()),
        };

        let engine = LiveEngine::new(&config, gateway, audit)?;
        let (feed_tx, feed_rx) = mpsc::channel(config.live.channel_capacity);
        let (signal_tx, signal_rx) = mpsc::channel(config.live.channel_capacity);
        let handle = tokio::spawn(engine.run(feed_rx, signal_rx));

        tracing::info!("Starting paper trading...");
        tokio::select! {
            result = self.pump_input(&feed_tx, &signal_tx) => result?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping live engine");
            }
        }
        drop(feed_tx);
        drop(signal_tx);

        let report = handle.await??;
        println!(
            "ticks={} bars={} signals={} orders={} broker_errors={}",
            report.ticks, report.bars, report.signals, report.orders, report.broker_errors
        );
        println!("{}", report.stats.summary());
        Ok(())
    }

    async fn pump_input(
        &self,
        feed_tx: &mpsc::Sender<FeedMessage>,
        signal_tx: &mpsc::Sender<Signal>,
    ) -> anyhow::Result<()> {
        match &self.input {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                pump_lines(BufReader::new(file), feed_tx, signal_tx).await
            }
            None => pump_lines(BufReader::new(tokio::io::stdin()), feed_tx, signal_tx).await,
        }
    }
}

async fn pump_lines(
    reader: impl AsyncBufRead + Unpin,
    feed_tx: &mpsc::Sender<FeedMessage>,
    signal_tx: &mpsc::Sender<Signal>,
) -> anyhow::Result<()> {
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let input: InputLine = match serde_json::from_str(trimmed) {
            Ok(input) => input,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping malformed input");
                continue;
            }
        };
        let sent = match input {
            InputLine::Tick(tick) => feed_tx.send(FeedMessage::Tick(tick)).await.is_ok(),
            InputLine::Indicators {
                instrument,
                indicators,
            } => feed_tx
                .send(FeedMessage::Indicators {
                    instrument,
                    indicators,
                })
                .await
                .is_ok(),
            InputLine::Signal(signal) => signal_tx.send(signal).await.is_ok(),
        };
        if !sent {
            tracing::warn!("Live engine stopped, input abandoned");
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pump_routes_lines() {
        let input = concat!(
            "{\"event\":\"tick\",\"instrument\":\"EURUSD\",\"bid\":\"1.1\",\"ask\":\"1.1002\",\"timestamp\":\"2024-03-04T10:00:00Z\"}\n",
            "not json\n",
            "{\"event\":\"signal\",\"timestamp\":\"2024-03-04T10:00:00Z\",\"instrument\":\"EURUSD\",\"side\":\"long\",\"price\":\"1.1\",\"stop\":\"1.095\",\"atr\":\"0.005\"}\n",
        );
        let (feed_tx, mut feed_rx) = mpsc::channel(4);
        let (signal_tx, mut signal_rx) = mpsc::channel(4);

        pump_lines(BufReader::new(input.as_bytes()), &feed_tx, &signal_tx)
            .await
            .unwrap();

        assert!(matches!(feed_rx.recv().await, Some(FeedMessage::Tick(_))));
        assert_eq!(signal_rx.recv().await.unwrap().instrument, "EURUSD");
    }
}
