//! Historical event replay from JSONL files

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

use super::BacktestError;
use crate::feed::Bar;
use crate::signal::{IndicatorSnapshot, Signal};

/// A closed bar together with the indicators computed at its close
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarEvent {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub indicators: IndicatorSnapshot,
}

impl BarEvent {
    pub fn bar(&self) -> Bar {
        Bar::new(
            self.instrument.clone(),
            self.timestamp,
            self.open,
            self.high,
            self.low,
            self.close,
        )
    }
}

impl From<(Bar, IndicatorSnapshot)> for BarEvent {
    fn from((bar, indicators): (Bar, IndicatorSnapshot)) -> Self {
        Self {
            instrument: bar.instrument,
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            indicators,
        }
    }
}

/// Market event from historical data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MarketEvent {
    Bar(BarEvent),
    Signal(Signal),
}

impl MarketEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MarketEvent::Bar(bar) => bar.timestamp,
            MarketEvent::Signal(signal) => signal.timestamp,
        }
    }

    pub fn instrument(&self) -> &str {
        match self {
            MarketEvent::Bar(bar) => &bar.instrument,
            MarketEvent::Signal(signal) => &signal.instrument,
        }
    }

    /// Bars sort before signals stamped with the same time, so a signal never
    /// fills on the bar that produced it
    fn sort_key(&self) -> (DateTime<Utc>, u8) {
        match self {
            MarketEvent::Bar(_) => (self.timestamp(), 0),
            MarketEvent::Signal(_) => (self.timestamp(), 1),
        }
    }
}

/// Time-ordered stream of historical events
#[derive(Debug, Default)]
pub struct EventStream {
    events: std::vec::IntoIter<MarketEvent>,
    len: usize,
}

impl EventStream {
    /// Build a stream from events in any order
    pub fn from_events(mut events: Vec<MarketEvent>) -> Self {
        events.sort_by_key(MarketEvent::sort_key);
        let len = events.len();
        Self {
            events: events.into_iter(),
            len,
        }
    }

    /// Read one JSON event per line; blank lines and `#` comments are skipped
    pub fn from_reader(reader: impl BufRead) -> Result<Self, BacktestError> {
        let mut events = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let event = serde_json::from_str(trimmed).map_err(|source| BacktestError::Parse {
                line: idx + 1,
                source,
            })?;
            events.push(event);
        }
        debug!(events = events.len(), "Parsed event stream");
        Ok(Self::from_events(events))
    }

    /// Load events from one or more JSONL files
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, BacktestError> {
        let mut events = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let file = File::open(path)?;
            let stream = Self::from_reader(BufReader::new(file))?;
            info!(path = %path.display(), events = stream.len, "Loaded events");
            events.extend(stream.events);
        }
        Ok(Self::from_events(events))
    }

    /// Total events in the stream
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Keep only events inside `[start, end)`
    pub fn window(self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        let events = self
            .events
            .filter(|e| start.map_or(true, |s| e.timestamp() >= s))
            .filter(|e| end.map_or(true, |t| e.timestamp() < t))
            .collect();
        Self::from_events(events)
    }
}

impl Iterator for EventStream {
    type Item = MarketEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.events.next()
    }
}
