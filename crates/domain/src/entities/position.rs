//! 持仓实体 (Position Aggregate Root)
//!
//! 由执行协调器在订单被券商接受后创建（OPEN），
//! 由持仓监控器在平仓条件触发时更新一次（CLOSED）

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::{ExitReason, OrderSide, PositionSide, PositionStatus, SignalType};
use crate::value_objects::Signal;

#[derive(Error, Debug, PartialEq)]
pub enum PositionError {
    #[error("持仓已平仓，无法修改")]
    PositionClosed,

    #[error("持仓参数无效: {0}")]
    InvalidParameter(String),
}

/// 订单在持仓中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRole {
    Entry,
    StopLoss,
    TakeProfit,
}

/// 持仓元数据
///
/// 保存券商订单ID、开仓信号快照与持仓时长覆盖；
/// 未识别的字段保留在 `extra` 中
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionMetadata {
    #[serde(default)]
    pub entry_order_id: Option<String>,
    #[serde(default)]
    pub stop_loss_order_id: Option<String>,
    #[serde(default)]
    pub take_profit_order_id: Option<String>,
    /// 全部关联订单ID，用于批量撤单
    #[serde(default)]
    pub order_ids: Vec<String>,
    #[serde(default)]
    pub entry_signal: Option<Signal>,
    #[serde(default)]
    pub strategy_id: String,
    /// 持仓时长覆盖（小时）
    #[serde(default)]
    pub hold_period_hours: Option<f64>,
    /// 由哪个条件平仓
    #[serde(default)]
    pub closed_by: Option<ExitReason>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// 一次平仓的结果，原子地写入持仓
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionClose {
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_reason: ExitReason,
    pub pnl: f64,
    pub pnl_percent: f64,
    pub metadata: PositionMetadata,
}

/// 持仓实体 - 聚合根
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub subscription_id: String,
    pub strategy_id: String,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub status: PositionStatus,
    pub entry_time: DateTime<Utc>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub pnl: Option<f64>,
    pub pnl_percent: Option<f64>,
    pub metadata: PositionMetadata,
}

/// P&L：多头 (exit - entry) * qty，空头 (entry - exit) * qty
pub fn calculate_pnl(side: PositionSide, entry_price: f64, exit_price: f64, quantity: f64) -> f64 {
    match side {
        PositionSide::Long => (exit_price - entry_price) * quantity,
        PositionSide::Short => (entry_price - exit_price) * quantity,
    }
}

/// 盈亏百分比：pnl / (entry * qty) * 100，名义价值为 0 时返回 0
pub fn calculate_pnl_percent(pnl: f64, entry_price: f64, quantity: f64) -> f64 {
    let notional = entry_price * quantity;
    if notional == 0.0 {
        return 0.0;
    }
    pnl / notional * 100.0
}

impl Position {
    /// 创建新持仓（OPEN）
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: String,
        subscription_id: String,
        strategy_id: String,
        symbol: String,
        side: PositionSide,
        quantity: f64,
        entry_price: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
        metadata: PositionMetadata,
    ) -> Result<Self, PositionError> {
        if !(quantity > 0.0) {
            return Err(PositionError::InvalidParameter(format!(
                "持仓数量必须大于零: {}",
                quantity
            )));
        }
        if !(entry_price > 0.0) {
            return Err(PositionError::InvalidParameter(format!(
                "开仓价格必须大于零: {}",
                entry_price
            )));
        }

        Ok(Self {
            id,
            subscription_id,
            strategy_id,
            symbol,
            side,
            quantity,
            entry_price,
            stop_loss,
            take_profit,
            status: PositionStatus::Open,
            entry_time: Utc::now(),
            exit_price: None,
            exit_time: None,
            exit_reason: None,
            pnl: None,
            pnl_percent: None,
            metadata,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// 平仓方向
    pub fn close_side(&self) -> OrderSide {
        self.side.close_side()
    }

    pub fn calculate_pnl(&self, exit_price: f64) -> f64 {
        calculate_pnl(self.side, self.entry_price, exit_price, self.quantity)
    }

    /// 根据订单ID判断订单角色
    pub fn classify_order(&self, order_id: &str) -> Option<OrderRole> {
        let meta = &self.metadata;
        if meta.stop_loss_order_id.as_deref() == Some(order_id) {
            Some(OrderRole::StopLoss)
        } else if meta.take_profit_order_id.as_deref() == Some(order_id) {
            Some(OrderRole::TakeProfit)
        } else if meta.entry_order_id.as_deref() == Some(order_id) {
            Some(OrderRole::Entry)
        } else {
            None
        }
    }

    /// 需要查询状态的订单ID（去重，保持顺序）
    pub fn tracked_order_ids(&self) -> Vec<String> {
        let meta = &self.metadata;
        let mut ids: Vec<String> = Vec::new();
        let candidates = meta
            .order_ids
            .iter()
            .chain(meta.entry_order_id.iter())
            .chain(meta.stop_loss_order_id.iter())
            .chain(meta.take_profit_order_id.iter());
        for id in candidates {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    /// 平仓时需要撤销的挂单（开仓单除外）
    pub fn linked_order_ids(&self) -> Vec<String> {
        let entry = self.metadata.entry_order_id.as_deref();
        self.tracked_order_ids()
            .into_iter()
            .filter(|id| Some(id.as_str()) != entry)
            .collect()
    }

    /// 止损/止盈成交后需要撤销的另一侧订单
    pub fn sibling_order_id(&self, filled: ExitReason) -> Option<&str> {
        match filled {
            ExitReason::StopLoss => self.metadata.take_profit_order_id.as_deref(),
            ExitReason::TakeProfit => self.metadata.stop_loss_order_id.as_deref(),
            _ => None,
        }
    }

    /// 已持仓小时数
    pub fn hours_held(&self, now: DateTime<Utc>) -> f64 {
        (now - self.entry_time).num_milliseconds() as f64 / 3_600_000.0
    }

    /// 持仓时长阈值：元数据覆盖优先，否则使用平台默认
    pub fn hold_period_hours(&self, default_hours: f64) -> f64 {
        self.metadata
            .hold_period_hours
            .filter(|h| *h > 0.0)
            .unwrap_or(default_hours)
    }

    pub fn entry_signal_type(&self) -> Option<SignalType> {
        self.metadata.entry_signal.as_ref().map(|s| s.signal)
    }

    /// 生成平仓结果；持仓已平仓时返回错误
    pub fn build_close(
        &self,
        exit_price: f64,
        exit_reason: ExitReason,
        exit_time: DateTime<Utc>,
    ) -> Result<PositionClose, PositionError> {
        if !self.is_open() {
            return Err(PositionError::PositionClosed);
        }
        let pnl = self.calculate_pnl(exit_price);
        let mut metadata = self.metadata.clone();
        metadata.closed_by = Some(exit_reason);

        Ok(PositionClose {
            exit_price,
            exit_time,
            exit_reason,
            pnl,
            pnl_percent: calculate_pnl_percent(pnl, self.entry_price, self.quantity),
            metadata,
        })
    }

    /// 应用平仓结果（OPEN -> CLOSED 只发生一次）
    pub fn apply_close(&mut self, close: &PositionClose) -> Result<(), PositionError> {
        if !self.is_open() {
            return Err(PositionError::PositionClosed);
        }
        self.status = PositionStatus::Closed;
        self.exit_price = Some(close.exit_price);
        self.exit_time = Some(close.exit_time);
        self.exit_reason = Some(close.exit_reason);
        self.pnl = Some(close.pnl);
        self.pnl_percent = Some(close.pnl_percent);
        self.metadata = close.metadata.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn position(side: PositionSide, entry: f64, qty: f64) -> Position {
        let metadata = PositionMetadata {
            entry_order_id: Some("e1".to_string()),
            stop_loss_order_id: Some("sl1".to_string()),
            take_profit_order_id: Some("tp1".to_string()),
            order_ids: vec!["e1".to_string(), "sl1".to_string(), "tp1".to_string()],
            strategy_id: "st1".to_string(),
            ..Default::default()
        };
        Position::open(
            "p1".to_string(),
            "sub1".to_string(),
            "st1".to_string(),
            "BTC-USDT-SWAP".to_string(),
            side,
            qty,
            entry,
            None,
            None,
            metadata,
        )
        .unwrap()
    }

    #[test]
    fn test_pnl_sign() {
        assert_eq!(calculate_pnl(PositionSide::Long, 100.0, 110.0, 2.0), 20.0);
        assert_eq!(calculate_pnl(PositionSide::Short, 100.0, 90.0, 2.0), 20.0);
        assert_eq!(calculate_pnl(PositionSide::Short, 100.0, 110.0, 2.0), -20.0);
    }

    #[test]
    fn test_pnl_percent() {
        assert_eq!(calculate_pnl_percent(20.0, 100.0, 2.0), 10.0);
        assert_eq!(calculate_pnl_percent(20.0, 0.0, 2.0), 0.0);
    }

    #[test]
    fn test_open_rejects_zero_quantity() {
        let result = Position::open(
            "p".into(),
            "s".into(),
            "st".into(),
            "BTC".into(),
            PositionSide::Long,
            0.0,
            100.0,
            None,
            None,
            PositionMetadata::default(),
        );
        assert!(matches!(result, Err(PositionError::InvalidParameter(_))));
    }

    #[test]
    fn test_classify_and_sibling() {
        let p = position(PositionSide::Long, 100.0, 1.0);
        assert_eq!(p.classify_order("sl1"), Some(OrderRole::StopLoss));
        assert_eq!(p.classify_order("tp1"), Some(OrderRole::TakeProfit));
        assert_eq!(p.classify_order("e1"), Some(OrderRole::Entry));
        assert_eq!(p.classify_order("x"), None);
        assert_eq!(p.sibling_order_id(ExitReason::StopLoss), Some("tp1"));
        assert_eq!(p.sibling_order_id(ExitReason::TakeProfit), Some("sl1"));
        assert_eq!(p.linked_order_ids(), vec!["sl1".to_string(), "tp1".to_string()]);
    }

    #[test]
    fn test_close_transitions_once() {
        let mut p = position(PositionSide::Long, 100.0, 2.0);
        let close = p.build_close(110.0, ExitReason::TakeProfit, Utc::now()).unwrap();
        assert_eq!(close.pnl, 20.0);
        assert_eq!(close.metadata.closed_by, Some(ExitReason::TakeProfit));

        p.apply_close(&close).unwrap();
        assert_eq!(p.status, PositionStatus::Closed);
        assert_eq!(p.exit_reason, Some(ExitReason::TakeProfit));
        assert_eq!(p.apply_close(&close), Err(PositionError::PositionClosed));
        assert!(p.build_close(120.0, ExitReason::Manual, Utc::now()).is_err());
    }

    #[test]
    fn test_hold_period_override() {
        let mut p = position(PositionSide::Short, 100.0, 1.0);
        assert_eq!(p.hold_period_hours(24.0), 24.0);
        p.metadata.hold_period_hours = Some(4.0);
        assert_eq!(p.hold_period_hours(24.0), 4.0);

        p.entry_time = Utc::now() - Duration::hours(5);
        assert!(p.hours_held(Utc::now()) >= 5.0);
    }

    #[test]
    fn test_metadata_keeps_unknown_fields() {
        let raw = r#"{"entryOrderId":"e1","orderIds":["e1"],"strategyId":"st1","brokerTag":"x"}"#;
        let meta: PositionMetadata = serde_json::from_str(raw).unwrap();
        assert_eq!(meta.entry_order_id.as_deref(), Some("e1"));
        assert_eq!(meta.extra.get("brokerTag"), Some(&serde_json::json!("x")));
    }
}
