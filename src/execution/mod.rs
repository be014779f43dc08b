//! Execution gateway module
//!
//! Broker calls made by the drivers after the decision core returns

mod paper;
mod types;

pub use paper::PaperGateway;
pub use types::{Fill, OrderId, OrderRequest};

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Trait for broker gateway implementations
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Place a market entry and return its fill
    async fn submit_order(&self, order: OrderRequest) -> anyhow::Result<Fill>;
    /// Move the protective stop of an open order
    async fn modify_stop(&self, id: OrderId, stop: Decimal) -> anyhow::Result<()>;
    /// Close an open order at market
    async fn close_position(&self, id: OrderId, price: Decimal) -> anyhow::Result<Fill>;
    /// Get all fills
    async fn get_fills(&self) -> anyhow::Result<Vec<Fill>>;
}
