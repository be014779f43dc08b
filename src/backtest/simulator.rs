//! Backtest simulator engine

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::{
    BacktestError, BacktestResult, BacktestSummary, BarEvent, EquityPoint, FillModel, MarketEvent,
};
use crate::audit::{AuditRecord, AuditSink, AuditStats};
use crate::config::Config;
use crate::decision::ExitKind;
use crate::engine::{DecisionCore, SignalOutcome};
use crate::feed::{Bar, FeedError};
use crate::signal::Signal;

/// Drives the decision core over historical events.
///
/// A signal waits for the next bar of its instrument and fills at that
/// bar's open; the same bar then updates positions and counterfactuals.
pub struct BacktestSimulator<'a> {
    core: DecisionCore,
    fill_model: FillModel,
    cooldown_bars: u32,
    audit: &'a mut dyn AuditSink,
    stats: AuditStats,
    start_balance: Decimal,
    pending: HashMap<String, Vec<Signal>>,
    bars_seen: HashMap<String, u64>,
    last_entry_bar: HashMap<String, u64>,
    last_bar: HashMap<String, (DateTime<Utc>, Decimal)>,
    last_time: Option<DateTime<Utc>>,
    equity_curve: Vec<EquityPoint>,
    worst_daily_dd_pct: Decimal,
    cooldown_skips: usize,
}

impl<'a> BacktestSimulator<'a> {
    /// Create a new simulator writing every decision to `audit`
    pub fn new(config: &Config, audit: &'a mut dyn AuditSink) -> Result<Self, BacktestError> {
        Ok(Self {
            core: DecisionCore::new(config)?,
            fill_model: FillModel::new(
                config.backtest.spread.clone(),
                config.backtest.slippage_atr,
            ),
            cooldown_bars: config.backtest.cooldown_bars,
            audit,
            stats: AuditStats::default(),
            start_balance: config.account.start_balance,
            pending: HashMap::new(),
            bars_seen: HashMap::new(),
            last_entry_bar: HashMap::new(),
            last_bar: HashMap::new(),
            last_time: None,
            equity_curve: Vec::new(),
            worst_daily_dd_pct: Decimal::ZERO,
            cooldown_skips: 0,
        })
    }

    pub fn core(&self) -> &DecisionCore {
        &self.core
    }

    /// Run the backtest over a time-ordered event sequence
    pub fn run(
        mut self,
        events: impl IntoIterator<Item = MarketEvent>,
    ) -> Result<BacktestResult, BacktestError> {
        for event in events {
            self.process(event)?;
        }
        self.finish()
    }

    /// Process a single event
    pub fn process(&mut self, event: MarketEvent) -> Result<(), BacktestError> {
        match event {
            MarketEvent::Signal(signal) => {
                debug!(
                    signal_id = %signal.id,
                    instrument = %signal.instrument,
                    side = signal.side.as_str(),
                    "Signal queued for next bar"
                );
                self.pending
                    .entry(signal.instrument.clone())
                    .or_default()
                    .push(signal);
                Ok(())
            }
            MarketEvent::Bar(event) => self.on_bar(event),
        }
    }

    fn on_bar(&mut self, event: BarEvent) -> Result<(), BacktestError> {
        let bar = event.bar();
        bar.validate()?;
        if let Some((last, _)) = self.last_bar.get(&bar.instrument) {
            if bar.timestamp <= *last {
                return Err(FeedError::OutOfOrder {
                    instrument: bar.instrument.clone(),
                    last: *last,
                    got: bar.timestamp,
                }
                .into());
            }
        }

        // The rollover must precede entries so they count against the new day
        self.core.roll_day(bar.timestamp);

        let bar_index = *self.bars_seen.get(&bar.instrument).unwrap_or(&0);
        if let Some(signals) = self.pending.remove(&bar.instrument) {
            for signal in signals {
                self.enter(&signal, &bar, bar_index)?;
            }
        }

        let report = self.core.on_bar(&bar, &event.indicators)?;
        for decision in report.decisions {
            self.emit(decision)?;
        }
        for cf in report.created.into_iter().chain(report.resolved) {
            self.emit(cf)?;
        }

        let account = self.core.account();
        self.worst_daily_dd_pct = self.worst_daily_dd_pct.min(account.daily_dd_pct());
        self.equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            balance: account.balance,
            equity: account.equity,
        });

        *self.bars_seen.entry(bar.instrument.clone()).or_default() += 1;
        self.last_time = Some(self.last_time.map_or(bar.timestamp, |t| t.max(bar.timestamp)));
        self.last_bar
            .insert(bar.instrument.clone(), (bar.timestamp, bar.close));
        Ok(())
    }

    /// Evaluate a pending signal at `bar`'s open and fill it if accepted
    fn enter(&mut self, signal: &Signal, bar: &Bar, bar_index: u64) -> Result<(), BacktestError> {
        if let Some(last_entry) = self.last_entry_bar.get(&bar.instrument) {
            if bar_index - last_entry < u64::from(self.cooldown_bars) {
                info!(
                    signal_id = %signal.id,
                    instrument = %bar.instrument,
                    bars_since_entry = bar_index - last_entry,
                    "Signal skipped: cooldown"
                );
                self.cooldown_skips += 1;
                return Ok(());
            }
        }

        let signal = signal.rebased(bar.open);
        let quote = self.fill_model.quote_at(bar.open);
        match self.core.evaluate_signal(&signal, &quote) {
            SignalOutcome::Accepted {
                decision,
                approval,
                volume,
            } => {
                self.emit(decision)?;
                let fill = self.fill_model.entry_fill(signal.side, &quote, signal.atr);
                let (_, opened) = self.core.open_position(
                    &signal,
                    fill,
                    bar.timestamp,
                    approval.sizing.risk_cash,
                    volume,
                )?;
                self.emit(opened)?;
                self.last_entry_bar.insert(bar.instrument.clone(), bar_index);
            }
            SignalOutcome::Rejected {
                decision,
                counterfactual,
                ..
            } => {
                self.emit(decision)?;
                if let Some(cf) = counterfactual {
                    self.emit(cf)?;
                }
            }
        }
        Ok(())
    }

    fn emit(&mut self, record: impl Into<AuditRecord>) -> Result<(), BacktestError> {
        let record = record.into();
        self.stats.observe(&record);
        self.audit.record(record)?;
        Ok(())
    }

    /// Close what is still open at the last prices and summarize
    fn finish(mut self) -> Result<BacktestResult, BacktestError> {
        let unfilled: usize = self.pending.values().map(Vec::len).sum();
        if unfilled > 0 {
            warn!(count = unfilled, "Signals left without a following bar");
        }

        if let Some(end) = self.last_time {
            let prices: HashMap<String, Decimal> = self
                .last_bar
                .iter()
                .map(|(instrument, (_, close))| (instrument.clone(), *close))
                .collect();
            for report in self.core.close_all(&prices, ExitKind::EndOfData, end)? {
                self.emit(report.decision)?;
                if let Some(cf) = report.counterfactual {
                    self.emit(cf)?;
                }
            }
            let account = self.core.account();
            self.equity_curve.push(EquityPoint {
                timestamp: end,
                balance: account.balance,
                equity: account.equity,
            });
        }
        self.audit.flush()?;

        let trades = self.core.closed_positions().to_vec();
        let summary = BacktestSummary::compute(
            self.start_balance,
            &trades,
            &self.equity_curve,
            self.worst_daily_dd_pct,
            &self.stats,
            self.core.tracker().active().len(),
        );
        info!(
            trades = summary.total_trades,
            total_r = %summary.total_r,
            net_pnl = %summary.net_pnl,
            rejected = summary.signals_rejected,
            cooldown_skips = self.cooldown_skips,
            "Backtest complete"
        );

        Ok(BacktestResult {
            summary,
            trades,
            equity_curve: self.equity_curve,
            stats: self.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::backtest::SpreadModel;
    use crate::decision::DecisionKind;
    use crate::signal::{IndicatorSnapshot, Side};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn bar(hour: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> MarketEvent {
        MarketEvent::Bar(BarEvent::from((
            Bar::new("EURUSD", t(hour), open, high, low, close),
            IndicatorSnapshot::default(),
        )))
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.backtest.spread = SpreadModel::Fixed { value: dec!(0) };
        config
    }

    fn long_signal(hour: i64) -> MarketEvent {
        MarketEvent::Signal(
            Signal::new("EURUSD", Side::Long, dec!(1.1000), dec!(1.0950), dec!(0.0050))
                .with_target(dec!(1.1100))
                .with_timestamp(t(hour)),
        )
    }

    #[test]
    fn test_signal_fills_at_next_open_and_hits_target() {
        let mut sink = MemoryAuditSink::new();
        let events = vec![
            bar(0, dec!(1.0990), dec!(1.1005), dec!(1.0985), dec!(1.1000)),
            long_signal(0),
            bar(1, dec!(1.1000), dec!(1.1040), dec!(1.0990), dec!(1.1030)),
            // trailing stop sits at 1.1025 after the first bar
            bar(2, dec!(1.1030), dec!(1.1120), dec!(1.1030), dec!(1.1110)),
        ];

        let result = BacktestSimulator::new(&config(), &mut sink)
            .unwrap()
            .run(events)
            .unwrap();

        assert_eq!(result.summary.total_trades, 1);
        let trade = &result.trades[0];
        assert_eq!(trade.entry_price, dec!(1.1000));
        assert_eq!(trade.entry_time, t(1));
        assert_eq!(trade.exit_kind(), Some(ExitKind::TakeProfit));
        assert_eq!(trade.result_r(), Some(dec!(2)));

        let kinds: Vec<_> = sink
            .records()
            .iter()
            .filter_map(|r| match r {
                AuditRecord::Decision(d) => Some(d.kind),
                AuditRecord::Counterfactual(_) => None,
            })
            .collect();
        assert_eq!(kinds.first(), Some(&DecisionKind::SignalAccepted));
        assert_eq!(kinds.get(1), Some(&DecisionKind::PositionOpened));
        assert!(kinds.contains(&DecisionKind::Exit {
            kind: ExitKind::TakeProfit
        }));
    }

    #[test]
    fn test_open_position_closed_at_end_of_data() {
        let mut sink = MemoryAuditSink::new();
        let events = vec![
            long_signal(0),
            bar(1, dec!(1.1000), dec!(1.1010), dec!(1.0990), dec!(1.1005)),
        ];

        let result = BacktestSimulator::new(&config(), &mut sink)
            .unwrap()
            .run(events)
            .unwrap();

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_kind(), Some(ExitKind::EndOfData));
        assert_eq!(result.trades[0].exit_price(), Some(dec!(1.1005)));
        assert_eq!(result.summary.exits_by_kind.get("end_of_data"), Some(&1));
    }

    #[test]
    fn test_duplicate_instrument_rejected() {
        let mut sink = MemoryAuditSink::new();
        let events = vec![
            long_signal(0),
            bar(1, dec!(1.1000), dec!(1.1010), dec!(1.0990), dec!(1.1005)),
            long_signal(1),
            bar(2, dec!(1.1005), dec!(1.1010), dec!(1.0995), dec!(1.1000)),
        ];

        let result = BacktestSimulator::new(&config(), &mut sink)
            .unwrap()
            .run(events)
            .unwrap();

        assert_eq!(result.summary.signals_accepted, 1);
        assert_eq!(
            result.summary.rejections_by_reason.get("duplicate_instrument"),
            Some(&1)
        );
    }

    #[test]
    fn test_cooldown_skips_signal() {
        let mut config = config();
        config.backtest.cooldown_bars = 5;
        let mut sink = MemoryAuditSink::new();
        let events = vec![
            long_signal(0),
            // stopped out on the fill bar
            bar(1, dec!(1.1000), dec!(1.1010), dec!(1.0940), dec!(1.0960)),
            long_signal(1),
            bar(2, dec!(1.0960), dec!(1.0970), dec!(1.0950), dec!(1.0965)),
        ];

        let result = BacktestSimulator::new(&config, &mut sink)
            .unwrap()
            .run(events)
            .unwrap();

        assert_eq!(result.summary.total_trades, 1);
        assert_eq!(result.trades[0].exit_kind(), Some(ExitKind::StopLoss));
        assert_eq!(result.summary.signals_accepted, 1);
        assert_eq!(result.summary.signals_rejected, 0);
    }

    #[test]
    fn test_out_of_order_bar_is_error() {
        let mut sink = MemoryAuditSink::new();
        let mut sim = BacktestSimulator::new(&config(), &mut sink).unwrap();
        sim.process(bar(2, dec!(1.1), dec!(1.1), dec!(1.1), dec!(1.1)))
            .unwrap();
        let err = sim
            .process(bar(1, dec!(1.1), dec!(1.1), dec!(1.1), dec!(1.1)))
            .unwrap_err();
        assert!(matches!(
            err,
            BacktestError::Feed(FeedError::OutOfOrder { .. })
        ));
    }
}
