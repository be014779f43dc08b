//! Live event loop

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{FeedMessage, LiveConfig, LiveReport};
use crate::audit::{AuditRecord, AuditSink};
use crate::config::Config;
use crate::decision::ExitKind;
use crate::engine::{DecisionCore, SignalOutcome};
use crate::execution::{ExecutionGateway, OrderId, OrderRequest};
use crate::feed::{Bar, BarAggregator, PriceTick, Quote};
use crate::risk::RiskError;
use crate::signal::{IndicatorSnapshot, Signal};

/// Live driver around the shared decision core.
///
/// One task owns the loop; every core call goes through the mutex and is
/// released before any broker call is awaited.
pub struct LiveEngine {
    config: LiveConfig,
    core: Arc<Mutex<DecisionCore>>,
    gateway: Arc<dyn ExecutionGateway>,
    audit: Box<dyn AuditSink>,
    aggregator: BarAggregator,
    indicators: HashMap<String, IndicatorSnapshot>,
    quotes: HashMap<String, (Quote, DateTime<Utc>)>,
    /// Latest trading day seen on the feed
    feed_day: Option<NaiveDate>,
    pending: HashMap<String, Vec<Signal>>,
    /// Position id to broker order id
    orders: HashMap<Uuid, OrderId>,
    report: LiveReport,
}

impl LiveEngine {
    pub fn new(
        config: &Config,
        gateway: Arc<dyn ExecutionGateway>,
        audit: Box<dyn AuditSink>,
    ) -> Result<Self, RiskError> {
        Ok(Self {
            config: config.live.clone(),
            core: Arc::new(Mutex::new(DecisionCore::new(config)?)),
            gateway,
            audit,
            aggregator: BarAggregator::new(config.live.bar_period_secs),
            indicators: HashMap::new(),
            quotes: HashMap::new(),
            feed_day: None,
            pending: HashMap::new(),
            orders: HashMap::new(),
            report: LiveReport::default(),
        })
    }

    /// Shared handle to the decision core, e.g. for status queries
    pub fn core(&self) -> Arc<Mutex<DecisionCore>> {
        Arc::clone(&self.core)
    }

    /// Broker order backing an open position
    pub fn order_for(&self, position_id: Uuid) -> Option<OrderId> {
        self.orders.get(&position_id).copied()
    }

    /// Run until the feed channel closes
    pub async fn run(
        mut self,
        mut feed_rx: mpsc::Receiver<FeedMessage>,
        mut signal_rx: mpsc::Receiver<Signal>,
    ) -> anyhow::Result<LiveReport> {
        let mut signals_open = true;

        info!(
            bar_period_secs = self.config.bar_period_secs,
            "Live engine started"
        );

        loop {
            tokio::select! {
                message = feed_rx.recv() => {
                    match message {
                        Some(message) => self.handle_feed(message).await?,
                        None => {
                            info!("Feed closed, shutting down");
                            break;
                        }
                    }
                }

                signal = signal_rx.recv(), if signals_open => {
                    match signal {
                        Some(signal) => self.handle_signal(signal).await?,
                        None => {
                            warn!("Signal channel closed");
                            signals_open = false;
                        }
                    }
                }
            }
        }

        self.shutdown().await
    }

    /// Process one feed message
    pub async fn handle_feed(&mut self, message: FeedMessage) -> anyhow::Result<()> {
        match message {
            FeedMessage::Tick(tick) => self.handle_tick(tick).await,
            FeedMessage::Indicators {
                instrument,
                indicators,
            } => {
                if let Err(e) = indicators.validate() {
                    warn!(%instrument, error = %e, "Ignoring invalid indicators");
                } else {
                    self.indicators.insert(instrument, indicators);
                }
                Ok(())
            }
        }
    }

    async fn handle_tick(&mut self, tick: PriceTick) -> anyhow::Result<()> {
        self.report.ticks += 1;
        let closed = match self.aggregator.on_tick(&tick) {
            Ok(closed) => closed,
            Err(e) => {
                self.report.bad_ticks += 1;
                error!(instrument = %tick.instrument, error = %e, "Dropping tick");
                return Ok(());
            }
        };
        if let Some(bar) = closed {
            self.handle_bar(bar).await?;
        }
        // The day follows the feed clock, as bars do in the backtest
        self.check_rollover(tick.timestamp).await;

        self.quotes
            .insert(tick.instrument.clone(), (tick.quote(), tick.timestamp));

        // Signals waiting for a quote at least as recent as themselves
        if let Some(waiting) = self.pending.remove(&tick.instrument) {
            let (ready, later): (Vec<_>, Vec<_>) = waiting
                .into_iter()
                .partition(|s| s.timestamp <= tick.timestamp);
            if !later.is_empty() {
                self.pending.insert(tick.instrument.clone(), later);
            }
            for signal in ready {
                self.evaluate(signal, tick.quote(), tick.timestamp).await?;
            }
        }
        Ok(())
    }

    /// Accept a signal from the producer
    pub async fn handle_signal(&mut self, signal: Signal) -> anyhow::Result<()> {
        self.report.signals += 1;
        self.indicators
            .entry(signal.instrument.clone())
            .or_insert(signal.indicators);

        match self.quotes.get(&signal.instrument).copied() {
            Some((quote, at)) if at >= signal.timestamp => self.evaluate(signal, quote, at).await,
            _ => {
                debug!(signal_id = %signal.id, "Signal waiting for a fresh quote");
                self.pending
                    .entry(signal.instrument.clone())
                    .or_default()
                    .push(signal);
                Ok(())
            }
        }
    }

    async fn evaluate(
        &mut self,
        signal: Signal,
        quote: Quote,
        quote_time: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let outcome = self.core.lock().await.evaluate_signal(&signal, &quote);
        let (decision, approval, volume) = match outcome {
            SignalOutcome::Accepted {
                decision,
                approval,
                volume,
            } => (decision, approval, volume),
            SignalOutcome::Rejected {
                decision,
                counterfactual,
                ..
            } => {
                self.emit(decision)?;
                if let Some(cf) = counterfactual {
                    self.emit(cf)?;
                }
                return Ok(());
            }
        };
        self.emit(decision)?;

        let order = OrderRequest {
            signal_id: signal.id,
            instrument: signal.instrument.clone(),
            side: signal.side,
            volume,
            reference_price: approval.fill_estimate,
            stop: signal.stop,
            target: signal.target,
        };
        let fill = match self.gateway.submit_order(order).await {
            Ok(fill) => fill,
            Err(e) => {
                self.report.broker_errors += 1;
                error!(signal_id = %signal.id, error = %e, "Order placement failed");
                return Ok(());
            }
        };
        self.report.orders += 1;

        // Stamped with the quote time: bars that started earlier skip it
        let opened = self.core.lock().await.open_position(
            &signal,
            fill.price,
            quote_time,
            approval.sizing.risk_cash,
            fill.volume,
        );
        match opened {
            Ok((position_id, decision)) => {
                self.orders.insert(position_id, fill.order_id);
                if let Some(stop) = decision.new_stop() {
                    self.modify_stop(position_id, stop).await;
                }
                self.emit(decision)?;
            }
            Err(e) => {
                error!(order_id = %fill.order_id, error = %e, "Fill rejected by core, flattening");
                if let Err(e) = self.gateway.close_position(fill.order_id, fill.price).await {
                    self.report.broker_errors += 1;
                    error!(order_id = %fill.order_id, error = %e, "Flatten failed");
                }
            }
        }
        Ok(())
    }

    async fn handle_bar(&mut self, bar: Bar) -> anyhow::Result<()> {
        self.report.bars += 1;
        let indicators = self
            .indicators
            .get(&bar.instrument)
            .copied()
            .unwrap_or_default();

        let (report, exits) = {
            let mut core = self.core.lock().await;
            let report = core.on_bar(&bar, &indicators)?;
            let exits: Vec<(Uuid, Decimal)> = report
                .closed
                .iter()
                .filter_map(|id| {
                    let price = core.manager().get(*id)?.exit_price()?;
                    Some((*id, price))
                })
                .collect();
            let (closed, resolved) = core.drain_history();
            if !closed.is_empty() || !resolved.is_empty() {
                debug!(
                    closed = closed.len(),
                    resolved = resolved.len(),
                    "Released audited history"
                );
            }
            (report, exits)
        };
        debug!(
            instrument = %bar.instrument,
            timestamp = %bar.timestamp,
            decisions = report.decisions.len(),
            "Bar processed"
        );

        for decision in report.decisions {
            if let (Some(position_id), Some(stop)) = (decision.position_id, decision.new_stop()) {
                self.modify_stop(position_id, stop).await;
            }
            self.emit(decision)?;
        }
        for cf in report.created.into_iter().chain(report.resolved) {
            self.emit(cf)?;
        }
        for (position_id, price) in exits {
            self.close_at_broker(position_id, price).await;
        }
        Ok(())
    }

    async fn check_rollover(&mut self, time: DateTime<Utc>) {
        let date = time.date_naive();
        if self.feed_day.is_some_and(|day| date <= day) {
            return;
        }
        self.feed_day = Some(date);
        if self.core.lock().await.roll_day(time) {
            info!(%date, "Day rollover");
        }
    }

    async fn modify_stop(&mut self, position_id: Uuid, stop: Decimal) {
        let Some(order_id) = self.orders.get(&position_id).copied() else {
            warn!(%position_id, "No broker order for position");
            return;
        };
        if let Err(e) = self.gateway.modify_stop(order_id, stop).await {
            self.report.broker_errors += 1;
            error!(%order_id, %stop, error = %e, "Stop modification failed");
        }
    }

    async fn close_at_broker(&mut self, position_id: Uuid, price: Decimal) {
        let Some(order_id) = self.orders.remove(&position_id) else {
            warn!(%position_id, "No broker order for closed position");
            return;
        };
        if let Err(e) = self.gateway.close_position(order_id, price).await {
            self.report.broker_errors += 1;
            error!(%order_id, error = %e, "Broker close failed");
        }
    }

    fn emit(&mut self, record: impl Into<AuditRecord>) -> anyhow::Result<()> {
        let record = record.into();
        self.report.stats.observe(&record);
        self.audit.record(record)?;
        Ok(())
    }

    /// Close what is open at the last mid prices and flush the audit log
    async fn shutdown(mut self) -> anyhow::Result<LiveReport> {
        let unfilled: usize = self.pending.values().map(Vec::len).sum();
        if unfilled > 0 {
            warn!(count = unfilled, "Signals dropped without a fresh quote");
        }

        let last_time = self.quotes.values().map(|(_, at)| *at).max();
        if let (true, Some(at)) = (self.config.close_on_shutdown, last_time) {
            let prices: HashMap<String, Decimal> = self
                .quotes
                .iter()
                .map(|(instrument, (quote, _))| (instrument.clone(), quote.mid()))
                .collect();
            let closed = self
                .core
                .lock()
                .await
                .close_all(&prices, ExitKind::Manual, at)?;
            for report in closed {
                self.close_at_broker(report.position_id, report.decision.price)
                    .await;
                self.emit(report.decision)?;
                if let Some(cf) = report.counterfactual {
                    self.emit(cf)?;
                }
            }
        }
        self.audit.flush()?;

        info!(
            ticks = self.report.ticks,
            bars = self.report.bars,
            orders = self.report.orders,
            "Live engine stopped"
        );
        Ok(self.report)
    }
}
