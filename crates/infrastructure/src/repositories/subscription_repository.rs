//! 订阅仓储实现

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{FromRow, MySql, Pool};
use tracing::{debug, warn};

use quant_relay_domain::traits::SubscriptionRepository;
use quant_relay_domain::{SubscriberSettings, Subscription};

/// 订阅数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionEntity {
    pub id: String,
    pub user_id: String,
    pub strategy_id: String,
    pub is_active: i8,
    pub is_paused: i8,
    pub broker_credentials_id: Option<String>,
    pub settings: Option<String>, // JSON
    pub total_trades: i64,
    pub total_pnl: f64,
}

impl SubscriptionEntity {
    /// 转换为领域实体；settings 解析失败按缺失处理
    pub fn to_domain(&self) -> Subscription {
        let settings = self.settings.as_deref().and_then(|raw| {
            serde_json::from_str::<SubscriberSettings>(raw)
                .map_err(|e| warn!("订阅 {} 的风控参数无法解析: {}", self.id, e))
                .ok()
        });

        Subscription {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            strategy_id: self.strategy_id.clone(),
            is_active: self.is_active != 0,
            is_paused: self.is_paused != 0,
            broker_credentials_id: self.broker_credentials_id.clone(),
            settings,
            total_trades: self.total_trades,
            total_pnl: self.total_pnl,
        }
    }
}

pub struct SqlxSubscriptionRepository {
    pool: Pool<MySql>,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn find_by_id(&self, subscription_id: &str) -> Result<Option<Subscription>> {
        let entity = sqlx::query_as::<_, SubscriptionEntity>(
            "SELECT id, user_id, strategy_id, is_active, is_paused, broker_credentials_id,
                    settings, total_trades, total_pnl
             FROM relay_subscription
             WHERE id = ?",
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity.map(|e| e.to_domain()))
    }

    async fn find_active_by_strategy(&self, strategy_id: &str) -> Result<Vec<Subscription>> {
        let entities = sqlx::query_as::<_, SubscriptionEntity>(
            "SELECT id, user_id, strategy_id, is_active, is_paused, broker_credentials_id,
                    settings, total_trades, total_pnl
             FROM relay_subscription
             WHERE strategy_id = ? AND is_active = 1",
        )
        .bind(strategy_id)
        .fetch_all(&self.pool)
        .await?;

        debug!("策略 {} 有效订阅数: {}", strategy_id, entities.len());
        Ok(entities.iter().map(|e| e.to_domain()).collect())
    }

    async fn record_trade_opened(&self, subscription_id: &str) -> Result<()> {
        sqlx::query("UPDATE relay_subscription SET total_trades = total_trades + 1 WHERE id = ?")
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_trade_closed(&self, subscription_id: &str, pnl: f64) -> Result<()> {
        sqlx::query("UPDATE relay_subscription SET total_pnl = total_pnl + ? WHERE id = ?")
            .bind(pnl)
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
