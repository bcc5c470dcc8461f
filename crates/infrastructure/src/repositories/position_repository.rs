//! 持仓仓储实现

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, MySql, Pool};
use tracing::{debug, info};

use quant_relay_domain::traits::PositionRepository;
use quant_relay_domain::{ExitReason, Position, PositionClose, PositionMetadata};

/// 持仓数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct PositionEntity {
    pub id: String,
    pub subscription_id: String,
    pub strategy_id: String,
    pub symbol: String,
    pub side: String, // LONG/SHORT
    pub quantity: f64,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub status: String, // OPEN/CLOSED
    pub entry_time: DateTime<Utc>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<String>,
    pub pnl: Option<f64>,
    pub pnl_percent: Option<f64>,
    pub metadata: String, // JSON
}

impl PositionEntity {
    /// 转换为领域实体
    pub fn to_domain(&self) -> Result<Position> {
        let metadata: PositionMetadata = serde_json::from_str(&self.metadata)?;
        let exit_reason = self
            .exit_reason
            .as_deref()
            .map(|r| r.parse::<ExitReason>())
            .transpose()
            .map_err(|e: String| anyhow!(e))?;

        Ok(Position {
            id: self.id.clone(),
            subscription_id: self.subscription_id.clone(),
            strategy_id: self.strategy_id.clone(),
            symbol: self.symbol.clone(),
            side: self.side.parse().map_err(|e: String| anyhow!(e))?,
            quantity: self.quantity,
            entry_price: self.entry_price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            status: self.status.parse().map_err(|e: String| anyhow!(e))?,
            entry_time: self.entry_time,
            exit_price: self.exit_price,
            exit_time: self.exit_time,
            exit_reason,
            pnl: self.pnl,
            pnl_percent: self.pnl_percent,
            metadata,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, subscription_id, strategy_id, symbol, side, quantity, \
     entry_price, stop_loss, take_profit, status, entry_time, exit_price, exit_time, \
     exit_reason, pnl, pnl_percent, metadata FROM relay_position";

/// 持仓仓储实现 (基于 sqlx)
pub struct SqlxPositionRepository {
    pool: Pool<MySql>,
}

impl SqlxPositionRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionRepository for SqlxPositionRepository {
    async fn insert(&self, position: &Position) -> Result<()> {
        let metadata = serde_json::to_string(&position.metadata)?;

        sqlx::query(
            "INSERT INTO relay_position
                (id, subscription_id, strategy_id, symbol, side, quantity, entry_price,
                 stop_loss, take_profit, status, entry_time, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&position.id)
        .bind(&position.subscription_id)
        .bind(&position.strategy_id)
        .bind(&position.symbol)
        .bind(position.side.as_str())
        .bind(position.quantity)
        .bind(position.entry_price)
        .bind(position.stop_loss)
        .bind(position.take_profit)
        .bind(position.status.as_str())
        .bind(position.entry_time)
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        debug!("保存持仓: id={}, symbol={}", position.id, position.symbol);
        Ok(())
    }

    async fn find_by_id(&self, position_id: &str) -> Result<Option<Position>> {
        let entity = sqlx::query_as::<_, PositionEntity>(&format!(
            "{} WHERE id = ? LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(position_id)
        .fetch_optional(&self.pool)
        .await?;

        entity.map(|e| e.to_domain()).transpose()
    }

    async fn find_open(&self) -> Result<Vec<Position>> {
        let entities = sqlx::query_as::<_, PositionEntity>(&format!(
            "{} WHERE status = 'OPEN' ORDER BY entry_time",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        entities.iter().map(|e| e.to_domain()).collect()
    }

    async fn count_open_by_subscription(&self, subscription_id: &str) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM relay_position WHERE subscription_id = ? AND status = 'OPEN'",
        )
        .bind(subscription_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u32)
    }

    async fn realized_pnl_since(
        &self,
        subscription_id: &str,
        since: DateTime<Utc>,
    ) -> Result<f64> {
        let total: Option<f64> = sqlx::query_scalar(
            "SELECT CAST(SUM(pnl) AS DOUBLE) FROM relay_position
             WHERE subscription_id = ? AND status = 'CLOSED' AND exit_time >= ?",
        )
        .bind(subscription_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.unwrap_or(0.0))
    }

    async fn close_if_open(&self, position_id: &str, close: &PositionClose) -> Result<bool> {
        let metadata = serde_json::to_string(&close.metadata)?;

        // 条件更新：只有 OPEN 的行会被修改
        let result = sqlx::query(
            "UPDATE relay_position
             SET status = 'CLOSED', exit_price = ?, exit_time = ?, exit_reason = ?,
                 pnl = ?, pnl_percent = ?, metadata = ?
             WHERE id = ? AND status = 'OPEN'",
        )
        .bind(close.exit_price)
        .bind(close.exit_time)
        .bind(close.exit_reason.as_str())
        .bind(close.pnl)
        .bind(close.pnl_percent)
        .bind(metadata)
        .bind(position_id)
        .execute(&self.pool)
        .await?;

        let closed = result.rows_affected() == 1;
        if closed {
            info!(
                "持仓已平仓: id={}, reason={}, pnl={:.4}",
                position_id, close.exit_reason, close.pnl
            );
        }
        Ok(closed)
    }
}
