//! Configuration loading

use prop_engine::backtest::SpreadModel;
use prop_engine::config::{Config, ConfigError};
use prop_engine::telemetry::LogFormat;
use rust_decimal_macros::dec;

#[test]
fn test_load_example_config_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, include_str!("../../config.toml.example")).unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.prop.max_daily_dd_pct, dec!(3.0));
    assert_eq!(config.manager.trailing_tiers.len(), 5);
    assert_eq!(config.manager.roi.tiers.len(), 4);
    assert!(!config.manager.roi.enabled);
    assert_eq!(config.backtest.spread, SpreadModel::Percent { pct: dec!(0.01) });
    assert_eq!(config.live.bar_period_secs, 3600);
    assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
}

#[test]
fn test_partial_config_overrides() {
    let toml = r#"
        [prop]
        risk_per_trade_pct = 1.0
        progressive_sizing = true

        [backtest.spread]
        type = "fixed"
        value = 0.00015

        [telemetry]
        log_format = "json"
        metrics_port = 9100
    "#;
    let config = Config::from_toml(toml).unwrap();
    assert_eq!(config.prop.risk_per_trade_pct, dec!(1.0));
    assert!(config.prop.progressive_sizing);
    assert_eq!(config.prop.max_total_dd_pct, dec!(8.0));
    assert_eq!(
        config.backtest.spread,
        SpreadModel::Fixed {
            value: dec!(0.00015)
        }
    );
    assert_eq!(config.telemetry.log_format, LogFormat::Json);
    assert_eq!(config.telemetry.metrics_port, Some(9100));
}

#[test]
fn test_invalid_sections_rejected() {
    let cases = [
        "[manager.time_stop]\nmax_bars = 0",
        "[live]\nbar_period_secs = 0",
        "[backtest]\nslippage_atr = -0.1",
        "[[manager.roi.tiers]]\nafter_bars = 10\nmin_profit_r = 1.0\n[[manager.roi.tiers]]\nafter_bars = 5\nmin_profit_r = 0.5",
        "[[manager.trailing_tiers]]\nthreshold_r = 1.0\ntrail_r = 0.0",
    ];
    for toml in cases {
        assert!(
            matches!(Config::from_toml(toml), Err(ConfigError::Invalid(_))),
            "accepted: {toml}"
        );
    }
    assert!(matches!(
        Config::from_toml("[prop]\nmax_positions = \"three\""),
        Err(ConfigError::Parse(_))
    ));
}
