//! Risk management types

use rust_decimal::Decimal;
use thiserror::Error;

/// Account bookkeeping errors
#[derive(Debug, Error, PartialEq)]
pub enum RiskError {
    /// Balance must be positive
    #[error("Invalid starting balance: {0}")]
    InvalidBalance(Decimal),
    /// Instrument is already open
    #[error("Instrument already has exposure: {0}")]
    AlreadyOpen(String),
    /// Instrument has no open exposure
    #[error("No open exposure on instrument: {0}")]
    NotOpen(String),
}
