//! 订阅实体

use serde::{Deserialize, Serialize};

/// 订阅者的资金与风控参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberSettings {
    /// 分配给该策略的资金
    pub capital: f64,
    /// 单笔风险（资金占比，0.02 = 2%）
    pub risk_per_trade: f64,
    pub leverage: f64,
    /// 最大同时持仓数，<= 0 表示不限制
    pub max_positions: i32,
    /// 单日最大亏损（金额），<= 0 表示不限制
    pub max_daily_loss: f64,
    pub is_active: bool,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            capital: 0.0,
            risk_per_trade: 0.01,
            leverage: 1.0,
            max_positions: 0,
            max_daily_loss: 0.0,
            is_active: true,
        }
    }
}

/// 用户对某个策略的订阅
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub strategy_id: String,
    pub is_active: bool,
    pub is_paused: bool,
    /// 券商凭证引用
    pub broker_credentials_id: Option<String>,
    /// 订阅者风控参数，缺失时跳过该订阅者
    pub settings: Option<SubscriberSettings>,
    /// 累计开仓次数
    #[serde(default)]
    pub total_trades: i64,
    /// 累计已实现盈亏
    #[serde(default)]
    pub total_pnl: f64,
}

impl Subscription {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        strategy_id: impl Into<String>,
        settings: SubscriberSettings,
        broker_credentials_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            strategy_id: strategy_id.into(),
            is_active: true,
            is_paused: false,
            broker_credentials_id,
            settings: Some(settings),
            total_trades: 0,
            total_pnl: 0.0,
        }
    }

    /// 是否可以接收信号
    pub fn is_tradable(&self) -> bool {
        self.is_active && !self.is_paused
    }

    /// 有效的风控参数（缺失或停用时返回 None）
    pub fn active_settings(&self) -> Option<&SubscriberSettings> {
        self.settings.as_ref().filter(|s| s.is_active)
    }
}
