//! Exit policy configuration

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// One rung of the trailing table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingTier {
    /// MFE in R that activates the tier
    pub threshold_r: Decimal,
    /// Stop distance behind the favorable extreme, in R
    pub trail_r: Decimal,
}

impl TrailingTier {
    pub fn new(threshold_r: Decimal, trail_r: Decimal) -> Self {
        Self {
            threshold_r,
            trail_r,
        }
    }
}

/// One step of the ROI schedule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiTier {
    /// Position age in bars from which the step applies
    pub after_bars: u32,
    /// Minimum profit accepted from then on, in R
    pub min_profit_r: Decimal,
}

impl RoiTier {
    pub fn new(after_bars: u32, min_profit_r: Decimal) -> Self {
        Self {
            after_bars,
            min_profit_r,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakevenConfig {
    pub enabled: bool,
    pub trigger_r: Decimal,
    pub offset_r: Decimal,
}

impl Default for BreakevenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_r: dec!(0.5),
            offset_r: dec!(0.05),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    pub enabled: bool,
    pub tiers: Vec<RoiTier>,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tiers: vec![
                RoiTier::new(0, dec!(3.0)),
                RoiTier::new(12, dec!(2.0)),
                RoiTier::new(24, dec!(1.0)),
                RoiTier::new(36, dec!(0.5)),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GivebackConfig {
    pub enabled: bool,
    /// MFE the position must have reached
    pub mfe_min_r: Decimal,
    /// Current profit at or below which the exit may fire
    pub current_max_r: Decimal,
    /// Long exits need RSI below this (shorts above 100 minus it)
    pub rsi_threshold: Decimal,
    /// Long exits need CMF below this (shorts above its negation)
    pub cmf_threshold: Decimal,
}

impl Default for GivebackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mfe_min_r: dec!(1.0),
            current_max_r: dec!(0.2),
            rsi_threshold: dec!(46),
            cmf_threshold: dec!(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadfishConfig {
    pub enabled: bool,
    pub min_bars: u32,
    /// MFE that must never have been reached
    pub mfe_floor_r: Decimal,
    pub current_max_r: Decimal,
    pub bb_width_threshold: Decimal,
}

impl Default for DeadfishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_bars: 24,
            mfe_floor_r: dec!(0.5),
            current_max_r: dec!(0.0),
            bb_width_threshold: dec!(0.005),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeStopConfig {
    pub max_bars: u32,
}

impl Default for TimeStopConfig {
    fn default() -> Self {
        Self { max_bars: 48 }
    }
}

/// Position manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub breakeven: BreakevenConfig,
    /// Sorted by threshold, highest first
    pub trailing_tiers: Vec<TrailingTier>,
    pub roi: RoiConfig,
    pub giveback: GivebackConfig,
    pub deadfish: DeadfishConfig,
    pub time_stop: TimeStopConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            breakeven: BreakevenConfig::default(),
            trailing_tiers: vec![
                TrailingTier::new(dec!(3.0), dec!(1.5)),
                TrailingTier::new(dec!(2.0), dec!(1.2)),
                TrailingTier::new(dec!(1.5), dec!(0.8)),
                TrailingTier::new(dec!(1.0), dec!(0.5)),
                TrailingTier::new(dec!(0.5), dec!(0.3)),
            ],
            roi: RoiConfig::default(),
            giveback: GivebackConfig::default(),
            deadfish: DeadfishConfig::default(),
            time_stop: TimeStopConfig::default(),
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.breakeven.trigger_r <= Decimal::ZERO {
            return Err(invalid("manager.breakeven.trigger_r must be positive"));
        }
        if self.breakeven.offset_r < Decimal::ZERO {
            return Err(invalid("manager.breakeven.offset_r must not be negative"));
        }

        for tier in &self.trailing_tiers {
            if tier.threshold_r <= Decimal::ZERO || tier.trail_r <= Decimal::ZERO {
                return Err(invalid(format!(
                    "trailing tier ({}, {}) must have positive threshold and distance",
                    tier.threshold_r, tier.trail_r
                )));
            }
        }
        if self
            .trailing_tiers
            .windows(2)
            .any(|w| w[0].threshold_r <= w[1].threshold_r)
        {
            return Err(invalid(
                "manager.trailing_tiers must be strictly descending by threshold_r",
            ));
        }

        for tier in &self.roi.tiers {
            if tier.min_profit_r < Decimal::ZERO {
                return Err(invalid(format!(
                    "roi tier at {} bars has negative profit {}",
                    tier.after_bars, tier.min_profit_r
                )));
            }
        }
        for w in self.roi.tiers.windows(2) {
            if w[0].after_bars >= w[1].after_bars {
                return Err(invalid(
                    "manager.roi.tiers must be strictly ascending by after_bars",
                ));
            }
            if w[1].min_profit_r > w[0].min_profit_r {
                return Err(invalid(
                    "manager.roi.tiers profit must not increase with age",
                ));
            }
        }
        if self.roi.enabled && self.roi.tiers.is_empty() {
            return Err(invalid("manager.roi is enabled without tiers"));
        }

        if self.time_stop.max_bars == 0 {
            return Err(invalid("manager.time_stop.max_bars must be positive"));
        }
        Ok(())
    }

    /// Tier number (1 = lowest threshold) of the highest tier met by `mfe_r`
    pub fn trailing_tier_for(&self, mfe_r: Decimal) -> Option<(u8, TrailingTier)> {
        let count = self.trailing_tiers.len();
        self.trailing_tiers
            .iter()
            .enumerate()
            .find(|(_, tier)| mfe_r >= tier.threshold_r)
            .map(|(idx, tier)| ((count - idx) as u8, *tier))
    }

    /// Most advanced ROI step reached at `bars_open`
    pub fn roi_tier_for(&self, bars_open: u32) -> Option<RoiTier> {
        if !self.roi.enabled {
            return None;
        }
        self.roi
            .tiers
            .iter()
            .rev()
            .find(|tier| tier.after_bars <= bars_open)
            .copied()
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
