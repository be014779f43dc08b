//! Live driver fed from channels, compared against the backtest driver

use prop_engine::audit::MemoryAuditSink;
use prop_engine::backtest::{BacktestSimulator, BarEvent, EventStream, MarketEvent, SpreadModel};
use prop_engine::config::Config;
use prop_engine::execution::{ExecutionGateway, OrderRequest, PaperGateway};
use prop_engine::feed::{Bar, PriceTick};
use prop_engine::live::{FeedMessage, LiveEngine};
use prop_engine::signal::{IndicatorSnapshot, Side, Signal};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::common::{long_signal, ts};

fn tick(hour: i64, minute: i64, mid: Decimal) -> PriceTick {
    PriceTick {
        instrument: "EURUSD".to_string(),
        bid: mid,
        ask: mid,
        timestamp: ts(hour) + chrono::Duration::minutes(minute),
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.backtest.spread = SpreadModel::Fixed { value: dec!(0) };
    config
}

#[test]
fn test_paper_gateway_lifecycle() {
    let gateway = PaperGateway::new(dec!(0.0001), dec!(2));
    let order = OrderRequest {
        signal_id: Uuid::new_v4(),
        instrument: "EURUSD".to_string(),
        side: Side::Short,
        volume: dec!(0.5),
        reference_price: dec!(1.1000),
        stop: dec!(1.1050),
        target: None,
    };

    let fill = tokio_test::block_on(gateway.submit_order(order)).unwrap();
    assert_eq!(fill.price, dec!(1.0999));
    assert_eq!(fill.fees, dec!(1));

    tokio_test::block_on(gateway.modify_stop(fill.order_id, dec!(1.1020))).unwrap();
    assert_eq!(
        tokio_test::block_on(gateway.stop_of(fill.order_id)),
        Some(dec!(1.1020))
    );

    let close = tokio_test::block_on(gateway.close_position(fill.order_id, dec!(1.0900))).unwrap();
    assert_eq!(close.price, dec!(1.0901));
    assert!(tokio_test::block_on(gateway.close_position(fill.order_id, dec!(1.0900))).is_err());
}

/// Flat ticks reproduce each bar's open, high, low and close in order
fn ticks_for(bars: &[Bar]) -> Vec<PriceTick> {
    let hour = |bar: &Bar| (bar.timestamp - ts(0)).num_hours();
    let mut ticks: Vec<PriceTick> = bars
        .iter()
        .flat_map(|bar| {
            let h = hour(bar);
            [
                tick(h, 0, bar.open),
                tick(h, 15, bar.high),
                tick(h, 30, bar.low),
                tick(h, 45, bar.close),
            ]
        })
        .collect();
    // closes the last bar
    if let Some(last) = bars.last() {
        ticks.push(tick(hour(last) + 1, 0, last.close));
    }
    ticks
}

#[tokio::test]
async fn test_live_matches_backtest_decisions() {
    let bars = vec![
        Bar::new("EURUSD", ts(0), dec!(0.9990), dec!(1.0005), dec!(0.9985), dec!(1.0000)),
        Bar::new("EURUSD", ts(1), dec!(1.0000), dec!(1.0030), dec!(0.9990), dec!(1.0020)),
        Bar::new("EURUSD", ts(2), dec!(1.0020), dec!(1.0080), dec!(1.0020), dec!(1.0070)),
        Bar::new("EURUSD", ts(3), dec!(1.0070), dec!(1.0075), dec!(1.0045), dec!(1.0050)),
    ];

    // Backtest: the signal fills at the open of the bar after it
    let mut events: Vec<MarketEvent> = bars
        .iter()
        .cloned()
        .map(|bar| MarketEvent::Bar(BarEvent::from((bar, IndicatorSnapshot::default()))))
        .collect();
    events.push(MarketEvent::Signal(long_signal()));
    let mut sink = MemoryAuditSink::new();
    let backtest = BacktestSimulator::new(&config(), &mut sink)
        .unwrap()
        .run(EventStream::from_events(events))
        .unwrap();

    // Live: the signal is sent once the bar it belongs to is complete
    let gateway = Arc::new(PaperGateway::new(dec!(0), dec!(0)));
    let engine = LiveEngine::new(&config(), gateway.clone(), Box::new(MemoryAuditSink::new())).unwrap();
    let core = engine.core();
    let (feed_tx, feed_rx) = mpsc::channel(64);
    let (signal_tx, signal_rx) = mpsc::channel(4);
    let handle = tokio::spawn(engine.run(feed_rx, signal_rx));

    let ticks = ticks_for(&bars);
    let (first_bar, rest) = ticks.split_at(4);
    for tick in first_bar {
        feed_tx.send(FeedMessage::Tick(tick.clone())).await.unwrap();
    }
    signal_tx.send(long_signal()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    for tick in rest {
        feed_tx.send(FeedMessage::Tick(tick.clone())).await.unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let live_stop = {
        let core = core.lock().await;
        assert_eq!(core.open_positions().len(), 1);
        core.open_positions()[0].stop
    };
    drop(feed_tx);
    drop(signal_tx);
    let report = handle.await.unwrap().unwrap();

    // The backtest closed at end of data, the live engine at shutdown
    let backtest_trade = &backtest.trades[0];
    assert_eq!(backtest_trade.entry_price, dec!(1.0000));
    assert_eq!(backtest_trade.stop, dec!(1.0040));
    assert_eq!(backtest_trade.stop, live_stop);
    assert_eq!(backtest.stats.stop_moves, report.stats.stop_moves);
    assert_eq!(backtest.stats.accepted, report.stats.accepted);
    assert_eq!(report.bars, 4);
}

#[tokio::test]
async fn test_live_matches_backtest_across_day_boundary() {
    let mut config = config();
    config.prop.max_daily_trades = 1;

    // Day one stops out the only allowed trade; day two must accept again
    let bars = vec![
        Bar::new("EURUSD", ts(22), dec!(0.9990), dec!(1.0005), dec!(0.9985), dec!(1.0000)),
        Bar::new("EURUSD", ts(23), dec!(1.0000), dec!(1.0010), dec!(0.9940), dec!(0.9945)),
        Bar::new("EURUSD", ts(24), dec!(0.9945), dec!(0.9960), dec!(0.9940), dec!(0.9950)),
        Bar::new("EURUSD", ts(25), dec!(0.9950), dec!(0.9965), dec!(0.9945), dec!(0.9960)),
    ];
    let first = long_signal().with_timestamp(ts(22));
    let second = Signal::new("EURUSD", Side::Long, dec!(0.9950), dec!(0.9900), dec!(0.0050))
        .with_timestamp(ts(24));

    let mut events: Vec<MarketEvent> = bars
        .iter()
        .cloned()
        .map(|bar| MarketEvent::Bar(BarEvent::from((bar, IndicatorSnapshot::default()))))
        .collect();
    events.push(MarketEvent::Signal(first.clone()));
    events.push(MarketEvent::Signal(second.clone()));
    let mut sink = MemoryAuditSink::new();
    let mut simulator = BacktestSimulator::new(&config, &mut sink).unwrap();
    for event in EventStream::from_events(events) {
        simulator.process(event).unwrap();
    }
    let backtest_account = simulator.core().account().clone();
    let backtest_accepted = simulator.core().open_positions().len();

    let gateway = Arc::new(PaperGateway::new(dec!(0), dec!(0)));
    let engine = LiveEngine::new(&config, gateway.clone(), Box::new(MemoryAuditSink::new())).unwrap();
    let core = engine.core();
    let (feed_tx, feed_rx) = mpsc::channel(64);
    let (signal_tx, signal_rx) = mpsc::channel(4);
    let handle = tokio::spawn(engine.run(feed_rx, signal_rx));

    let ticks = ticks_for(&bars);
    let (day_one, rest) = ticks.split_at(4);
    let (overnight, rest) = rest.split_at(8);
    for tick in day_one {
        feed_tx.send(FeedMessage::Tick(tick.clone())).await.unwrap();
    }
    signal_tx.send(first).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    for tick in overnight {
        feed_tx.send(FeedMessage::Tick(tick.clone())).await.unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    signal_tx.send(second).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    for tick in rest {
        feed_tx.send(FeedMessage::Tick(tick.clone())).await.unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let (live_account, live_open) = {
        let core = core.lock().await;
        (core.account().clone(), core.open_positions().len())
    };
    drop(feed_tx);
    drop(signal_tx);
    let report = handle.await.unwrap().unwrap();

    assert_eq!(backtest_account.day_start_balance, dec!(99500));
    assert_eq!(backtest_account.trades_today, 1);
    assert_eq!(backtest_accepted, 1);

    assert_eq!(live_account.day_start_balance, backtest_account.day_start_balance);
    assert_eq!(live_account.trades_today, backtest_account.trades_today);
    assert_eq!(live_open, backtest_accepted);
    assert_eq!(report.orders, 2);
    assert_eq!(report.stats.accepted, 2);
    assert!(report.stats.rejections.is_empty());
}
