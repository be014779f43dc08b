//! Paper trading gateway

use super::{ExecutionGateway, Fill, OrderId, OrderRequest};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Open paper order with its current protective stop
#[derive(Debug, Clone)]
struct PaperTicket {
    request: OrderRequest,
    stop: Decimal,
}

/// Paper trading gateway with simulated fills
pub struct PaperGateway {
    /// Adverse price offset applied to every fill
    slippage: Decimal,
    /// Fee per unit of volume
    fee_per_lot: Decimal,
    fills: Arc<RwLock<Vec<Fill>>>,
    tickets: Arc<RwLock<HashMap<OrderId, PaperTicket>>>,
}

impl PaperGateway {
    pub fn new(slippage: Decimal, fee_per_lot: Decimal) -> Self {
        Self {
            slippage,
            fee_per_lot,
            fills: Arc::new(RwLock::new(vec![])),
            tickets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Current stop of an open paper order
    pub async fn stop_of(&self, id: OrderId) -> Option<Decimal> {
        self.tickets.read().await.get(&id).map(|t| t.stop)
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn submit_order(&self, order: OrderRequest) -> anyhow::Result<Fill> {
        if order.volume <= Decimal::ZERO {
            anyhow::bail!("Paper order rejected: volume {}", order.volume);
        }
        let order_id = OrderId::new_v4();
        let price = order.side.offset(order.reference_price, -self.slippage);
        let fill = Fill {
            order_id,
            instrument: order.instrument.clone(),
            side: order.side,
            price,
            volume: order.volume,
            timestamp: Utc::now(),
            fees: order.volume * self.fee_per_lot,
        };

        self.tickets.write().await.insert(
            order_id,
            PaperTicket {
                stop: order.stop,
                request: order,
            },
        );
        self.fills.write().await.push(fill.clone());

        tracing::info!(?order_id, %price, "Paper order filled");
        Ok(fill)
    }

    async fn modify_stop(&self, id: OrderId, stop: Decimal) -> anyhow::Result<()> {
        let mut tickets = self.tickets.write().await;
        let ticket = tickets
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("Unknown paper order {id}"))?;
        ticket.stop = stop;
        tracing::debug!(?id, %stop, "Paper stop modified");
        Ok(())
    }

    async fn close_position(&self, id: OrderId, price: Decimal) -> anyhow::Result<Fill> {
        let ticket = self
            .tickets
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| anyhow::anyhow!("Unknown paper order {id}"))?;
        let request = ticket.request;
        // Closing trades the opposite side, so slippage moves the price
        // against the position
        let fill = Fill {
            order_id: id,
            instrument: request.instrument,
            side: request.side,
            price: request.side.offset(price, -self.slippage),
            volume: request.volume,
            timestamp: Utc::now(),
            fees: request.volume * self.fee_per_lot,
        };
        self.fills.write().await.push(fill.clone());
        tracing::info!(?id, price = %fill.price, "Paper position closed");
        Ok(fill)
    }

    async fn get_fills(&self) -> anyhow::Result<Vec<Fill>> {
        let fills = self.fills.read().await;
        Ok(fills.clone())
    }
}
