//! 策略配置实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{ExecutionStatus, SignalType, Timeframe};

/// 策略配置（执行期间只读）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySettings {
    /// 策略ID
    pub id: String,
    pub name: String,
    /// 交易对，如 BTC-USDT-SWAP
    pub symbol: String,
    /// K线周期
    pub timeframe: Timeframe,
    /// 默认单笔风险（资金占比）
    pub default_risk_per_trade: f64,
    /// 默认杠杆
    pub default_leverage: f64,
    /// 默认持仓时长（小时），为空时使用平台默认值
    pub hold_period_hours: Option<f64>,
    pub is_active: bool,
    /// 策略自定义参数，原样传给信号进程
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl StrategySettings {
    pub fn new(id: impl Into<String>, symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            symbol: symbol.into(),
            timeframe,
            default_risk_per_trade: 0.01,
            default_leverage: 1.0,
            hold_period_hours: None,
            is_active: true,
            parameters: serde_json::Value::Null,
        }
    }
}

/// 策略级执行状态汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyExecutionStatus {
    pub last_executed_at: DateTime<Utc>,
    pub last_interval_key: String,
    pub last_status: ExecutionStatus,
    pub last_signal_type: Option<SignalType>,
    pub last_trades_generated: u32,
    pub last_worker_id: String,
}
