//! 模拟券商（本地运行与演练）
//!
//! 开仓按请求价格立即成交，止损止盈单保持挂单，
//! 直到调用 `mark_filled` 模拟触发

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use quant_relay_domain::traits::{BrokerGateway, OrderPlacement, OrderRequest, OrderStatusReport};
use quant_relay_domain::{BrokerCredentials, OrderSide, OrderStatus};

#[derive(Clone, Default)]
pub struct PaperBrokerGateway {
    orders: Arc<DashMap<String, OrderStatusReport>>,
    /// 最近一次开仓价，用于平仓成交价
    last_prices: Arc<DashMap<String, f64>>,
}

impl PaperBrokerGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, status: OrderStatus, quantity: f64, price: Option<f64>) -> String {
        let order_id = Uuid::new_v4().to_string();
        self.orders.insert(
            order_id.clone(),
            OrderStatusReport {
                order_id: order_id.clone(),
                status,
                filled_quantity: if status == OrderStatus::Filled { quantity } else { 0.0 },
                average_price: price,
            },
        );
        order_id
    }

    /// 模拟条件单触发成交
    pub fn mark_filled(&self, order_id: &str, price: f64) -> Result<()> {
        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| anyhow!("订单不存在: {}", order_id))?;
        order.status = OrderStatus::Filled;
        order.average_price = Some(price);
        Ok(())
    }

    /// 更新模拟行情价
    pub fn set_price(&self, symbol: &str, price: f64) {
        self.last_prices.insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl BrokerGateway for PaperBrokerGateway {
    fn name(&self) -> &'static str {
        "paper"
    }

    async fn get_order_status(
        &self,
        _credentials: &BrokerCredentials,
        _symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatusReport> {
        self.orders
            .get(order_id)
            .map(|o| o.clone())
            .ok_or_else(|| anyhow!("订单不存在: {}", order_id))
    }

    async fn place_order(
        &self,
        _credentials: &BrokerCredentials,
        request: &OrderRequest,
    ) -> Result<OrderPlacement> {
        let order_id = self.record(OrderStatus::Filled, request.quantity, Some(request.price));
        self.set_price(&request.symbol, request.price);
        let stop_loss_order_id = request
            .stop_loss
            .map(|_| self.record(OrderStatus::Open, request.quantity, None));
        let take_profit_order_id = request
            .take_profit
            .map(|_| self.record(OrderStatus::Open, request.quantity, None));

        info!(
            "📝 模拟开仓: {} {} {} @ {}",
            request.symbol,
            request.side.as_str(),
            request.quantity,
            request.price
        );
        Ok(OrderPlacement {
            order_id,
            stop_loss_order_id,
            take_profit_order_id,
            fill_price: Some(request.price),
        })
    }

    async fn place_market_order(
        &self,
        _credentials: &BrokerCredentials,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderPlacement> {
        let price = self.last_prices.get(symbol).map(|p| *p);
        let order_id = self.record(OrderStatus::Filled, quantity, price);
        info!("📝 模拟市价单: {} {} {} @ {:?}", symbol, side.as_str(), quantity, price);
        Ok(OrderPlacement {
            order_id,
            fill_price: price,
            ..Default::default()
        })
    }

    async fn cancel_order(
        &self,
        _credentials: &BrokerCredentials,
        _symbol: &str,
        order_id: &str,
    ) -> Result<()> {
        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| anyhow!("订单不存在: {}", order_id))?;
        if !order.status.is_terminal() {
            order.status = OrderStatus::Cancelled;
        }
        Ok(())
    }
}
