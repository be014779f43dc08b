//! Configuration types for prop-engine

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::backtest::BacktestConfig;
use crate::counterfactual::CounterfactualConfig;
use crate::live::LiveConfig;
use crate::position::ManagerConfig;
use crate::risk::{ExecLimits, PropLimits};
use crate::telemetry::LogFormat;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub account: AccountConfig,
    pub prop: PropLimits,
    pub execution: ExecLimits,
    pub manager: ManagerConfig,
    pub counterfactual: CounterfactualConfig,
    pub backtest: BacktestConfig,
    pub live: LiveConfig,
    pub audit: AuditConfig,
    pub telemetry: TelemetryConfig,
}

/// Account and instrument contract settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub start_balance: Decimal,
    /// Units per lot
    pub contract_size: Decimal,
    /// Smallest volume increment
    pub lot_step: Decimal,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            start_balance: dec!(100000),
            contract_size: dec!(100000),
            lot_step: dec!(0.01),
        }
    }
}

/// Audit log configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// JSONL file; no file is written when unset
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("audit/decisions.jsonl")),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Prometheus exporter port; disabled when unset
    pub metrics_port: Option<u16>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let account = &self.account;
        positive("account.start_balance", account.start_balance)?;
        positive("account.contract_size", account.contract_size)?;
        positive("account.lot_step", account.lot_step)?;

        let prop = &self.prop;
        positive("prop.max_daily_dd_pct", prop.max_daily_dd_pct)?;
        positive("prop.max_total_dd_pct", prop.max_total_dd_pct)?;
        positive("prop.risk_per_trade_pct", prop.risk_per_trade_pct)?;
        positive("prop.max_open_risk_pct", prop.max_open_risk_pct)?;
        if prop.dd_safety_margin_pct < Decimal::ZERO
            || prop.dd_safety_margin_pct >= prop.max_total_dd_pct
        {
            return Err(ConfigError::Invalid(format!(
                "prop.dd_safety_margin_pct {} must be in [0, max_total_dd_pct)",
                prop.dd_safety_margin_pct
            )));
        }
        if prop.max_positions == 0 {
            return Err(ConfigError::Invalid("prop.max_positions must be positive".into()));
        }
        if prop.max_daily_trades == 0 {
            return Err(ConfigError::Invalid(
                "prop.max_daily_trades must be positive".into(),
            ));
        }

        positive("execution.max_spread_atr", self.execution.max_spread_atr)?;
        positive("execution.max_slippage_atr", self.execution.max_slippage_atr)?;
        if self.execution.min_bb_width < Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "execution.min_bb_width must not be negative".into(),
            ));
        }

        self.manager.validate()?;

        if self.counterfactual.max_bars == 0 {
            return Err(ConfigError::Invalid(
                "counterfactual.max_bars must be positive".into(),
            ));
        }

        self.backtest.validate()?;
        self.live.validate()?;
        Ok(())
    }
}

fn positive(field: &str, value: Decimal) -> Result<(), ConfigError> {
    if value <= Decimal::ZERO {
        return Err(ConfigError::Invalid(format!(
            "{field} must be positive, got {value}"
        )));
    }
    Ok(())
}
