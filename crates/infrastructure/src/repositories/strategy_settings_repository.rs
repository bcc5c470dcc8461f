//! 策略配置仓储实现

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::{FromRow, MySql, Pool};
use tracing::debug;

use quant_relay_domain::traits::StrategySettingsRepository;
use quant_relay_domain::{StrategyExecutionStatus, StrategySettings, Timeframe};

/// 策略配置数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct StrategySettingsEntity {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub timeframe: String,
    pub default_risk_per_trade: f64,
    pub default_leverage: f64,
    pub hold_period_hours: Option<f64>,
    pub is_active: i8, // MySQL tinyint(1)
    pub parameters: Option<String>, // JSON
}

impl StrategySettingsEntity {
    /// 转换为领域实体
    pub fn to_domain(&self) -> Result<StrategySettings> {
        let timeframe: Timeframe = self
            .timeframe
            .parse()
            .map_err(|e: String| anyhow!("策略 {} 周期无效: {}", self.id, e))?;

        let parameters = match self.parameters.as_deref() {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw)?,
            _ => serde_json::Value::Null,
        };

        Ok(StrategySettings {
            id: self.id.clone(),
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            timeframe,
            default_risk_per_trade: self.default_risk_per_trade,
            default_leverage: self.default_leverage,
            hold_period_hours: self.hold_period_hours,
            is_active: self.is_active != 0,
            parameters,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, name, symbol, timeframe, default_risk_per_trade, \
     default_leverage, hold_period_hours, is_active, parameters FROM relay_strategy";

/// 策略配置仓储实现 (基于 sqlx)
pub struct SqlxStrategySettingsRepository {
    pool: Pool<MySql>,
}

impl SqlxStrategySettingsRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StrategySettingsRepository for SqlxStrategySettingsRepository {
    async fn find_by_id(&self, strategy_id: &str) -> Result<Option<StrategySettings>> {
        debug!("查询策略配置: id={}", strategy_id);

        let entity = sqlx::query_as::<_, StrategySettingsEntity>(&format!(
            "{} WHERE id = ? LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(strategy_id)
        .fetch_optional(&self.pool)
        .await?;

        entity.map(|e| e.to_domain()).transpose()
    }

    async fn find_by_symbol_and_timeframe(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<StrategySettings>> {
        let entities = sqlx::query_as::<_, StrategySettingsEntity>(&format!(
            "{} WHERE is_active = 1 AND symbol = ? AND timeframe = ?",
            SELECT_COLUMNS
        ))
        .bind(symbol)
        .bind(timeframe.as_str())
        .fetch_all(&self.pool)
        .await?;

        entities.iter().map(|e| e.to_domain()).collect()
    }

    async fn update_execution_status(
        &self,
        strategy_id: &str,
        status: &StrategyExecutionStatus,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO relay_strategy_execution_status
                (strategy_id, last_executed_at, last_interval_key, last_status,
                 last_signal_type, last_trades_generated, last_worker_id)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                last_executed_at = VALUES(last_executed_at),
                last_interval_key = VALUES(last_interval_key),
                last_status = VALUES(last_status),
                last_signal_type = VALUES(last_signal_type),
                last_trades_generated = VALUES(last_trades_generated),
                last_worker_id = VALUES(last_worker_id)",
        )
        .bind(strategy_id)
        .bind(status.last_executed_at)
        .bind(&status.last_interval_key)
        .bind(status.last_status.as_str())
        .bind(status.last_signal_type.map(|s| s.as_str()))
        .bind(status.last_trades_generated)
        .bind(&status.last_worker_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
