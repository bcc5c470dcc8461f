//! 执行与持仓事件（通知通道使用）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{ExitReason, PositionSide, SignalType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayEvent {
    ExecutionStarted {
        strategy_id: String,
        interval_key: String,
        worker_id: String,
        subscribers_count: u32,
    },
    ExecutionCompleted {
        strategy_id: String,
        interval_key: String,
        signal_type: Option<SignalType>,
        subscribers_count: u32,
        trades_generated: u32,
        duration_ms: u64,
    },
    ExecutionFailed {
        strategy_id: String,
        interval_key: Option<String>,
        error: String,
    },
    PositionOpened {
        position_id: String,
        subscription_id: String,
        strategy_id: String,
        symbol: String,
        side: PositionSide,
        quantity: f64,
        entry_price: f64,
    },
    PositionClosed {
        position_id: String,
        subscription_id: String,
        symbol: String,
        exit_reason: ExitReason,
        exit_price: f64,
        pnl: f64,
        pnl_percent: f64,
    },
}

impl RelayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RelayEvent::ExecutionStarted { .. } => "EXECUTION_STARTED",
            RelayEvent::ExecutionCompleted { .. } => "EXECUTION_COMPLETED",
            RelayEvent::ExecutionFailed { .. } => "EXECUTION_FAILED",
            RelayEvent::PositionOpened { .. } => "POSITION_OPENED",
            RelayEvent::PositionClosed { .. } => "POSITION_CLOSED",
        }
    }
}

/// 带时间戳的事件包装，发布到外部通道时使用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: RelayEvent,
}

impl EventEnvelope {
    pub fn now(event: RelayEvent) -> Self {
        Self {
            emitted_at: Utc::now(),
            event,
        }
    }
}
