//! 策略信号值对象
//!
//! 外部信号进程按 JSON 约定返回，字段使用 camelCase

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::StrategySettings;
use crate::enums::SignalType;

/// 策略在一个周期内的决策，创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub signal: SignalType,
    pub price: f64,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Signal {
    pub fn new(signal: SignalType, price: f64) -> Self {
        Self {
            signal,
            price,
            quantity: None,
            stop_loss: None,
            take_profit: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_stop_loss(mut self, stop_loss: f64) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn with_take_profit(mut self, take_profit: f64) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    pub fn is_hold(&self) -> bool {
        self.signal == SignalType::Hold
    }
}

/// 发给信号进程的请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalRequest {
    pub strategy_id: String,
    pub execution_time: DateTime<Utc>,
    pub settings: StrategySettings,
}

/// 信号进程的响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalResponse {
    pub success: bool,
    #[serde(default)]
    pub signal: Option<Signal>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl SignalResponse {
    pub fn ok(signal: Option<Signal>) -> Self {
        Self {
            success: true,
            signal,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
