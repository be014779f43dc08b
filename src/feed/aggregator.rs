//! Tick-to-bar aggregation for the live driver

use super::{Bar, FeedError, PriceTick};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Bar currently being built from ticks
#[derive(Debug, Clone)]
struct PartialBar {
    start: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
}

impl PartialBar {
    fn new(start: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            start,
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }

    fn push(&mut self, price: Decimal) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }

    fn finish(self, instrument: &str) -> Bar {
        Bar::new(
            instrument,
            self.start,
            self.open,
            self.high,
            self.low,
            self.close,
        )
    }
}

/// Builds fixed-period OHLC bars from mid prices.
///
/// A bar is emitted when the first tick of a later period arrives. Ticks must
/// arrive in non-decreasing timestamp order per instrument.
pub struct BarAggregator {
    period_secs: i64,
    building: HashMap<String, PartialBar>,
    last_tick: HashMap<String, DateTime<Utc>>,
}

impl BarAggregator {
    /// Create an aggregator producing bars of `period_secs` seconds
    pub fn new(period_secs: u64) -> Self {
        Self {
            period_secs: period_secs.max(1) as i64,
            building: HashMap::new(),
            last_tick: HashMap::new(),
        }
    }

    fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = ts.timestamp().div_euclid(self.period_secs) * self.period_secs;
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or(ts)
    }

    /// Feed one tick, returning the bar it closed, if any
    pub fn on_tick(&mut self, tick: &PriceTick) -> Result<Option<Bar>, FeedError> {
        tick.quote().validate()?;

        if let Some(&last) = self.last_tick.get(&tick.instrument) {
            if tick.timestamp < last {
                return Err(FeedError::OutOfOrder {
                    instrument: tick.instrument.clone(),
                    last,
                    got: tick.timestamp,
                });
            }
        }
        self.last_tick
            .insert(tick.instrument.clone(), tick.timestamp);

        let mid = tick.quote().mid();
        let start = self.bucket_start(tick.timestamp);

        match self.building.get_mut(&tick.instrument) {
            Some(current) if current.start == start => {
                current.push(mid);
                Ok(None)
            }
            Some(_) => {
                let closed = self
                    .building
                    .insert(tick.instrument.clone(), PartialBar::new(start, mid))
                    .map(|bar| bar.finish(&tick.instrument));
                Ok(closed)
            }
            None => {
                self.building
                    .insert(tick.instrument.clone(), PartialBar::new(start, mid));
                Ok(None)
            }
        }
    }

    /// Emit the partial bar of `instrument`, e.g. at shutdown
    pub fn flush(&mut self, instrument: &str) -> Option<Bar> {
        self.building
            .remove(instrument)
            .map(|bar| bar.finish(instrument))
    }

    /// Instruments with a bar in progress
    pub fn instruments(&self) -> Vec<String> {
        let mut names: Vec<String> = self.building.keys().cloned().collect();
        names.sort();
        names
    }
}
