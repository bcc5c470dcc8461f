//! 策略执行审计记录（只追加）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{ExecutionStatus, SignalType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub strategy_id: String,
    pub interval_key: String,
    pub status: ExecutionStatus,
    pub signal_type: Option<SignalType>,
    pub subscribers_count: u32,
    pub trades_generated: u32,
    pub duration_ms: u64,
    pub worker_id: String,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn new(
        strategy_id: &str,
        interval_key: &str,
        worker_id: &str,
        status: ExecutionStatus,
    ) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            interval_key: interval_key.to_string(),
            status,
            signal_type: None,
            subscribers_count: 0,
            trades_generated: 0,
            duration_ms: 0,
            worker_id: worker_id.to_string(),
            error: None,
            executed_at: Utc::now(),
        }
    }

    pub fn with_signal(mut self, signal_type: Option<SignalType>) -> Self {
        self.signal_type = signal_type;
        self
    }

    pub fn with_counts(mut self, subscribers_count: u32, trades_generated: u32) -> Self {
        self.subscribers_count = subscribers_count;
        self.trades_generated = trades_generated;
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
