//! Shared fixtures

use chrono::{DateTime, Duration, TimeZone, Utc};
use prop_engine::config::Config;
use prop_engine::feed::{Bar, Quote};
use prop_engine::position::TrailingTier;
use prop_engine::signal::{Side, Signal};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub fn ts(hour: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap() + Duration::hours(hour)
}

pub fn bar(hour: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
    Bar::new("EURUSD", ts(hour), open, high, low, close)
}

/// 100k account, 0.5 % risk, 3 % daily limit, three trailing tiers
pub fn scenario_config() -> Config {
    let mut config = Config::default();
    config.manager.breakeven.offset_r = dec!(0.02);
    config.manager.trailing_tiers = vec![
        TrailingTier::new(dec!(3.0), dec!(1.5)),
        TrailingTier::new(dec!(2.0), dec!(1.0)),
        TrailingTier::new(dec!(1.5), dec!(0.7)),
    ];
    config.manager.giveback.mfe_min_r = dec!(0.5);
    config
}

/// Long at 1.0000 with a 0.9950 stop (R = 0.005)
pub fn long_signal() -> Signal {
    Signal::new("EURUSD", Side::Long, dec!(1.0000), dec!(0.9950), dec!(0.0050))
        .with_timestamp(ts(0))
}

/// Short at 1.0000 with a 1.0050 stop
pub fn short_signal() -> Signal {
    Signal::new("EURUSD", Side::Short, dec!(1.0000), dec!(1.0050), dec!(0.0050))
        .with_timestamp(ts(0))
}

pub fn flat_quote(price: Decimal) -> Quote {
    Quote::new(price, price)
}
