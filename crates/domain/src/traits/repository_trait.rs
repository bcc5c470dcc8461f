//! 仓储接口 - 定义数据访问的抽象

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{
    BrokerCredentials, ExecutionRecord, Position, PositionClose, StrategyExecutionStatus,
    StrategySettings, Subscription,
};
use crate::enums::Timeframe;

/// 策略配置仓储接口
#[async_trait]
pub trait StrategySettingsRepository: Send + Sync {
    /// 根据ID查询配置
    async fn find_by_id(&self, strategy_id: &str) -> Result<Option<StrategySettings>>;

    /// 查询交易对和周期下注册的策略
    async fn find_by_symbol_and_timeframe(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<StrategySettings>>;

    /// 更新策略级执行状态汇总
    async fn update_execution_status(
        &self,
        strategy_id: &str,
        status: &StrategyExecutionStatus,
    ) -> Result<()>;
}

/// 订阅仓储接口
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn find_by_id(&self, subscription_id: &str) -> Result<Option<Subscription>>;

    /// 查询策略的有效订阅（is_active = true）
    async fn find_active_by_strategy(&self, strategy_id: &str) -> Result<Vec<Subscription>>;

    /// 开仓后累加交易次数
    async fn record_trade_opened(&self, subscription_id: &str) -> Result<()>;

    /// 平仓后累加已实现盈亏
    async fn record_trade_closed(&self, subscription_id: &str, pnl: f64) -> Result<()>;
}

/// 券商凭证仓储接口
#[async_trait]
pub trait BrokerCredentialsRepository: Send + Sync {
    async fn find_by_id(&self, credentials_id: &str) -> Result<Option<BrokerCredentials>>;
}

/// 持仓仓储接口
#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn insert(&self, position: &Position) -> Result<()>;

    async fn find_by_id(&self, position_id: &str) -> Result<Option<Position>>;

    /// 查询全部 OPEN 持仓
    async fn find_open(&self) -> Result<Vec<Position>>;

    async fn count_open_by_subscription(&self, subscription_id: &str) -> Result<u32>;

    /// 订阅者自 `since` 起平仓的已实现盈亏合计
    async fn realized_pnl_since(&self, subscription_id: &str, since: DateTime<Utc>)
        -> Result<f64>;

    /// 仅当持仓仍为 OPEN 时写入平仓结果
    ///
    /// 返回 false 表示已被其他检查先行平仓
    async fn close_if_open(&self, position_id: &str, close: &PositionClose) -> Result<bool>;
}

/// 执行记录仓储接口（只追加）
#[async_trait]
pub trait ExecutionRecordRepository: Send + Sync {
    async fn append(&self, record: &ExecutionRecord) -> Result<()>;

    /// 策略在 `after` 之后最近一次 SUCCESS 记录
    async fn latest_success_after(
        &self,
        strategy_id: &str,
        after: DateTime<Utc>,
    ) -> Result<Option<ExecutionRecord>>;
}
