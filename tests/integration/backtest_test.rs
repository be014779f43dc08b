//! Backtest driver end to end over a JSONL event file

use prop_engine::audit::{AuditRecord, AuditStats, JsonlAuditSink};
use prop_engine::backtest::{BacktestSimulator, EventStream, SpreadModel};
use prop_engine::config::Config;
use prop_engine::decision::DecisionKind;
use rust_decimal_macros::dec;

const EVENTS: &str = r#"
{"event":"bar","instrument":"EURUSD","timestamp":"2024-03-04T09:00:00Z","open":"1.0990","high":"1.1005","low":"1.0985","close":"1.1000"}
{"event":"signal","timestamp":"2024-03-04T09:00:00Z","instrument":"EURUSD","side":"long","price":"1.1000","stop":"1.0950","target":"1.1100","atr":"0.0050"}
{"event":"bar","instrument":"EURUSD","timestamp":"2024-03-04T10:00:00Z","open":"1.1000","high":"1.1010","low":"1.0990","close":"1.1005"}
{"event":"signal","timestamp":"2024-03-04T10:00:00Z","instrument":"GBPUSD","side":"short","price":"1.2700","stop":"1.2750","target":"1.2650","atr":"0.0050","indicators":{"bb_width":"0.001"}}
{"event":"bar","instrument":"GBPUSD","timestamp":"2024-03-04T11:00:00Z","open":"1.2700","high":"1.2710","low":"1.2690","close":"1.2695"}
{"event":"bar","instrument":"EURUSD","timestamp":"2024-03-04T11:00:00Z","open":"1.1005","high":"1.1030","low":"1.1000","close":"1.1025"}
{"event":"bar","instrument":"EURUSD","timestamp":"2024-03-05T00:00:00Z","open":"1.1025","high":"1.1110","low":"1.1020","close":"1.1100"}
{"event":"bar","instrument":"GBPUSD","timestamp":"2024-03-05T00:00:00Z","open":"1.2695","high":"1.2700","low":"1.2600","close":"1.2610"}
"#;

fn config() -> Config {
    let mut config = Config::default();
    config.backtest.spread = SpreadModel::Fixed { value: dec!(0) };
    config
}

#[test]
fn test_backtest_writes_audit_log() {
    let dir = tempfile::tempdir().unwrap();
    let events_path = dir.path().join("events.jsonl");
    let audit_path = dir.path().join("audit").join("decisions.jsonl");
    std::fs::write(&events_path, EVENTS).unwrap();

    let events = EventStream::load(&[&events_path]).unwrap();
    assert_eq!(events.len(), 8);

    let mut sink = JsonlAuditSink::open(&audit_path).unwrap();
    let result = BacktestSimulator::new(&config(), &mut sink)
        .unwrap()
        .run(events)
        .unwrap();
    drop(sink);

    let summary = &result.summary;
    assert_eq!(summary.total_trades, 1);
    assert_eq!(summary.wins, 1);
    assert_eq!(summary.total_r, dec!(2));
    assert_eq!(summary.net_pnl, dec!(1000));
    assert_eq!(summary.exits_by_kind.get("take_profit"), Some(&1));
    assert_eq!(
        summary.rejections_by_reason.get("volatility_squeeze"),
        Some(&1)
    );
    assert_eq!(summary.verdicts.get("good_reject"), None);
    assert_eq!(summary.verdicts.get("missed_gain"), Some(&1));

    let records = JsonlAuditSink::read_all(&audit_path).unwrap();
    let stats = AuditStats::from_records(&records);
    assert_eq!(stats, result.stats);
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.opened, 1);
    assert!(stats.stop_moves >= 1);

    // Audit log is in decision order: accept, open, then management
    let kinds: Vec<_> = records
        .iter()
        .filter_map(|r| match r {
            AuditRecord::Decision(d) => Some(d.kind),
            AuditRecord::Counterfactual(_) => None,
        })
        .collect();
    assert_eq!(kinds[0], DecisionKind::SignalAccepted);
    assert_eq!(kinds[1], DecisionKind::PositionOpened);

    let table = summary.format_table();
    assert!(table.contains("BACKTEST RESULTS"));
    assert!(table.contains("volatility_squeeze"));
}

#[test]
fn test_same_events_same_decisions() {
    let run = || {
        let mut sink = prop_engine::audit::MemoryAuditSink::new();
        let events = EventStream::from_reader(EVENTS.as_bytes()).unwrap();
        let result = BacktestSimulator::new(&config(), &mut sink)
            .unwrap()
            .run(events)
            .unwrap();
        let codes: Vec<String> = sink
            .records()
            .iter()
            .filter_map(|r| match r {
                AuditRecord::Decision(d) => Some(format!("{}:{}", d.kind.code(), d.price)),
                AuditRecord::Counterfactual(_) => None,
            })
            .collect();
        (result.summary, codes)
    };

    let (first, first_codes) = run();
    let (second, second_codes) = run();
    assert_eq!(first, second);
    assert_eq!(first_codes, second_codes);
}
