//! 策略执行记录仓储（只追加）

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, MySql, Pool};
use tracing::debug;

use quant_relay_domain::traits::ExecutionRecordRepository;
use quant_relay_domain::{ExecutionRecord, SignalType};

#[derive(Debug, Clone, FromRow)]
pub struct ExecutionRecordEntity {
    pub strategy_id: String,
    pub interval_key: String,
    pub status: String,
    pub signal_type: Option<String>,
    pub subscribers_count: u32,
    pub trades_generated: u32,
    pub duration_ms: u64,
    pub worker_id: String,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionRecordEntity {
    pub fn to_domain(&self) -> Result<ExecutionRecord> {
        let signal_type = self
            .signal_type
            .as_deref()
            .map(|s| s.parse::<SignalType>())
            .transpose()
            .map_err(|e| anyhow!(e))?;

        Ok(ExecutionRecord {
            strategy_id: self.strategy_id.clone(),
            interval_key: self.interval_key.clone(),
            status: self.status.parse().map_err(|e: String| anyhow!(e))?,
            signal_type,
            subscribers_count: self.subscribers_count,
            trades_generated: self.trades_generated,
            duration_ms: self.duration_ms,
            worker_id: self.worker_id.clone(),
            error: self.error.clone(),
            executed_at: self.executed_at,
        })
    }
}

pub struct SqlxExecutionRecordRepository {
    pool: Pool<MySql>,
}

impl SqlxExecutionRecordRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRecordRepository for SqlxExecutionRecordRepository {
    async fn append(&self, record: &ExecutionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO relay_execution_record
                (strategy_id, interval_key, status, signal_type, subscribers_count,
                 trades_generated, duration_ms, worker_id, error, executed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.strategy_id)
        .bind(&record.interval_key)
        .bind(record.status.as_str())
        .bind(record.signal_type.map(|s| s.as_str()))
        .bind(record.subscribers_count)
        .bind(record.trades_generated)
        .bind(record.duration_ms)
        .bind(&record.worker_id)
        .bind(&record.error)
        .bind(record.executed_at)
        .execute(&self.pool)
        .await?;

        debug!(
            "写入执行记录: strategy={}, interval={}, status={}",
            record.strategy_id,
            record.interval_key,
            record.status.as_str()
        );
        Ok(())
    }

    async fn latest_success_after(
        &self,
        strategy_id: &str,
        after: DateTime<Utc>,
    ) -> Result<Option<ExecutionRecord>> {
        let entity = sqlx::query_as::<_, ExecutionRecordEntity>(
            "SELECT strategy_id, interval_key, status, signal_type, subscribers_count,
                    trades_generated, duration_ms, worker_id, error, executed_at
             FROM relay_execution_record
             WHERE strategy_id = ? AND status = 'SUCCESS' AND executed_at > ?
             ORDER BY executed_at DESC
             LIMIT 1",
        )
        .bind(strategy_id)
        .bind(after)
        .fetch_optional(&self.pool)
        .await?;

        entity.map(|e| e.to_domain()).transpose()
    }
}
