//! 券商网关抽象接口
//!
//! services层依赖接口，infrastructure层实现接口

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entities::BrokerCredentials;
use crate::enums::{OrderSide, OrderStatus};

/// 开仓下单请求（市价开仓 + 可选止损止盈条件单）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// 参考价格（信号价格）
    pub price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub leverage: f64,
    /// 客户端订单ID前缀
    pub client_tag: Option<String>,
}

/// 券商受理结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPlacement {
    pub order_id: String,
    pub stop_loss_order_id: Option<String>,
    pub take_profit_order_id: Option<String>,
    /// 市价成交均价（已知时）
    pub fill_price: Option<f64>,
}

impl OrderPlacement {
    /// 全部订单ID
    pub fn all_order_ids(&self) -> Vec<String> {
        std::iter::once(self.order_id.clone())
            .chain(self.stop_loss_order_id.clone())
            .chain(self.take_profit_order_id.clone())
            .collect()
    }
}

/// 订单状态查询结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub order_id: String,
    pub status: OrderStatus,
    pub filled_quantity: f64,
    pub average_price: Option<f64>,
}

impl OrderStatusReport {
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }
}

/// 券商网关接口
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// 网关名称
    fn name(&self) -> &'static str;

    async fn get_order_status(
        &self,
        credentials: &BrokerCredentials,
        symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatusReport>;

    /// 开仓并挂止损/止盈
    async fn place_order(
        &self,
        credentials: &BrokerCredentials,
        request: &OrderRequest,
    ) -> Result<OrderPlacement>;

    /// 市价单（平仓使用，reduce-only）
    async fn place_market_order(
        &self,
        credentials: &BrokerCredentials,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderPlacement>;

    async fn cancel_order(
        &self,
        credentials: &BrokerCredentials,
        symbol: &str,
        order_id: &str,
    ) -> Result<()>;
}
