//! Signal types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Trading side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy, profit when price rises
    Long,
    /// Sell, profit when price falls
    Short,
}

impl Side {
    /// Price movement from `from` to `to`, positive when it favors this side
    pub fn favorable_move(self, from: Decimal, to: Decimal) -> Decimal {
        match self {
            Side::Long => to - from,
            Side::Short => from - to,
        }
    }

    /// Move `price` by `distance` in this side's favorable direction.
    ///
    /// A negative distance moves against the side (used for stops).
    pub fn offset(self, price: Decimal, distance: Decimal) -> Decimal {
        match self {
            Side::Long => price + distance,
            Side::Short => price - distance,
        }
    }

    /// True if `candidate` is strictly further in the favorable direction than `current`
    pub fn is_better(self, candidate: Decimal, current: Decimal) -> bool {
        match self {
            Side::Long => candidate > current,
            Side::Short => candidate < current,
        }
    }

    /// Lowercase label for logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

/// Strategy family that produced the signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    MeanReversion,
    Trend,
}

/// Indicator context at signal time or at a bar close.
///
/// Fixed record validated once at the producer boundary; the position state
/// machine only ever reads these four values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSnapshot {
    /// Relative strength index, 0..=100
    pub rsi: Decimal,
    /// Chaikin money flow, -1..=1
    pub cmf: Decimal,
    /// Normalized Bollinger band width (band span / mid)
    pub bb_width: Decimal,
    /// Slow trend filter, when the producer computes one
    pub ema200: Option<Decimal>,
}

impl Default for IndicatorSnapshot {
    fn default() -> Self {
        Self {
            rsi: dec!(50),
            cmf: Decimal::ZERO,
            bb_width: dec!(0.01),
            ema200: None,
        }
    }
}

impl IndicatorSnapshot {
    /// Check ranges of the oscillators
    pub fn validate(&self) -> Result<(), SignalError> {
        if self.rsi < Decimal::ZERO || self.rsi > dec!(100) {
            return Err(SignalError::IndicatorOutOfRange("rsi", self.rsi));
        }
        if self.cmf < dec!(-1) || self.cmf > Decimal::ONE {
            return Err(SignalError::IndicatorOutOfRange("cmf", self.cmf));
        }
        if self.bb_width < Decimal::ZERO {
            return Err(SignalError::IndicatorOutOfRange("bb_width", self.bb_width));
        }
        Ok(())
    }
}

/// Invalid signal input from the producer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("empty instrument")]
    EmptyInstrument,
    #[error("non-positive signal price {0}")]
    InvalidPrice(Decimal),
    #[error("missing stop")]
    MissingStop,
    #[error("stop {stop} on wrong side of price {price} for {side:?}")]
    StopWrongSide {
        side: Side,
        price: Decimal,
        stop: Decimal,
    },
    #[error("target {target} on wrong side of price {price} for {side:?}")]
    TargetWrongSide {
        side: Side,
        price: Decimal,
        target: Decimal,
    },
    #[error("negative ATR {0}")]
    NegativeAtr(Decimal),
    #[error("indicator {0} out of range: {1}")]
    IndicatorOutOfRange(&'static str, Decimal),
}

/// A trade signal. Read-only to the decision core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Unique signal identifier
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Time of the confirmed signal bar
    pub timestamp: DateTime<Utc>,
    /// Instrument symbol
    pub instrument: String,
    /// Trade direction
    pub side: Side,
    /// Reference price (close of the signal bar)
    pub price: Decimal,
    /// Protective stop
    pub stop: Decimal,
    /// Indicative take-profit
    #[serde(default)]
    pub target: Option<Decimal>,
    /// Average true range at signal time
    pub atr: Decimal,
    /// Indicator context
    #[serde(default)]
    pub indicators: IndicatorSnapshot,
    /// Producing strategy
    #[serde(default)]
    pub strategy: StrategyKind,
    /// Free-form sub-type tag used by calibration reports
    #[serde(default)]
    pub sub_type: String,
}

impl Signal {
    /// Create a new signal stamped now
    pub fn new(
        instrument: impl Into<String>,
        side: Side,
        price: Decimal,
        stop: Decimal,
        atr: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            instrument: instrument.into(),
            side,
            price,
            stop,
            target: None,
            atr,
            indicators: IndicatorSnapshot::default(),
            strategy: StrategyKind::default(),
            sub_type: String::new(),
        }
    }

    pub fn with_target(mut self, target: Decimal) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_indicators(mut self, indicators: IndicatorSnapshot) -> Self {
        self.indicators = indicators;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.sub_type = sub_type.into();
        self
    }

    /// Distance between reference price and stop
    pub fn risk_distance(&self) -> Decimal {
        (self.price - self.stop).abs()
    }

    /// Distance between reference price and target, if any
    pub fn target_distance(&self) -> Option<Decimal> {
        self.target.map(|t| (t - self.price).abs())
    }

    /// Copy of this signal re-referenced to `price`, stop and target keeping
    /// their distances.
    pub fn rebased(&self, price: Decimal) -> Signal {
        let shift = price - self.price;
        Signal {
            price,
            stop: self.stop + shift,
            target: self.target.map(|t| t + shift),
            ..self.clone()
        }
    }

    /// Validate at the producer boundary
    pub fn validate(&self) -> Result<(), SignalError> {
        if self.instrument.trim().is_empty() {
            return Err(SignalError::EmptyInstrument);
        }
        if self.price <= Decimal::ZERO {
            return Err(SignalError::InvalidPrice(self.price));
        }
        if self.stop <= Decimal::ZERO {
            return Err(SignalError::MissingStop);
        }
        if !self.side.is_better(self.price, self.stop) {
            return Err(SignalError::StopWrongSide {
                side: self.side,
                price: self.price,
                stop: self.stop,
            });
        }
        if let Some(target) = self.target {
            if !self.side.is_better(target, self.price) {
                return Err(SignalError::TargetWrongSide {
                    side: self.side,
                    price: self.price,
                    target,
                });
            }
        }
        if self.atr < Decimal::ZERO {
            return Err(SignalError::NegativeAtr(self.atr));
        }
        self.indicators.validate()
    }
}
