//! Market data types

use crate::signal::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Market data errors. These indicate a caller defect, not a market condition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    /// Bar prices are inconsistent
    #[error("invalid bar for {instrument} at {timestamp}: {detail}")]
    InvalidBar {
        instrument: String,
        timestamp: DateTime<Utc>,
        detail: String,
    },
    /// Quote is crossed or non-positive
    #[error("invalid quote bid={bid} ask={ask}")]
    InvalidQuote { bid: Decimal, ask: Decimal },
    /// Data arrived with a timestamp older than data already processed
    #[error("out-of-order data for {instrument}: {got} < {last}")]
    OutOfOrder {
        instrument: String,
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },
}

/// One OHLC bar for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Instrument symbol
    pub instrument: String,
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Bar {
    pub fn new(
        instrument: impl Into<String>,
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// Check price consistency: positive, low <= open/close <= high
    pub fn validate(&self) -> Result<(), FeedError> {
        let detail = if self.low <= Decimal::ZERO {
            Some(format!("non-positive low {}", self.low))
        } else if self.high < self.low {
            Some(format!("high {} below low {}", self.high, self.low))
        } else if self.open < self.low || self.open > self.high {
            Some(format!("open {} outside range", self.open))
        } else if self.close < self.low || self.close > self.high {
            Some(format!("close {} outside range", self.close))
        } else {
            None
        };

        match detail {
            Some(detail) => Err(FeedError::InvalidBar {
                instrument: self.instrument.clone(),
                timestamp: self.timestamp,
                detail,
            }),
            None => Ok(()),
        }
    }
}

/// Broker quote at decision time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl Quote {
    pub fn new(bid: Decimal, ask: Decimal) -> Self {
        Self { bid, ask }
    }

    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Expected fill for a market order: ask for longs, bid for shorts
    pub fn fill_for(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.ask,
            Side::Short => self.bid,
        }
    }

    pub fn validate(&self) -> Result<(), FeedError> {
        if self.bid <= Decimal::ZERO || self.ask < self.bid {
            return Err(FeedError::InvalidQuote {
                bid: self.bid,
                ask: self.ask,
            });
        }
        Ok(())
    }
}

/// A single quote tick from the broker feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    /// Instrument symbol
    pub instrument: String,
    pub bid: Decimal,
    pub ask: Decimal,
    /// Broker timestamp
    pub timestamp: DateTime<Utc>,
}

impl PriceTick {
    pub fn quote(&self) -> Quote {
        Quote::new(self.bid, self.ask)
    }
}
