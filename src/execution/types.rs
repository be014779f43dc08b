//! Execution types

use crate::signal::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broker order identifier
pub type OrderId = Uuid;

/// A market entry order derived from an accepted signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Signal that produced the order
    pub signal_id: Uuid,
    pub instrument: String,
    pub side: Side,
    pub volume: Decimal,
    /// Price the decision was taken at
    pub reference_price: Decimal,
    /// Protective stop to attach
    pub stop: Decimal,
    pub target: Option<Decimal>,
}

/// A fill (executed trade)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub instrument: String,
    pub side: Side,
    pub price: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
    pub fees: Decimal,
}
