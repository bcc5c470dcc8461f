//! 内存存储
//!
//! 实现全部仓储接口，用于测试和无数据库的单机运行

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use quant_relay_domain::traits::{
    BrokerCredentialsRepository, ExecutionRecordRepository, PositionRepository,
    StrategySettingsRepository, SubscriptionRepository,
};
use quant_relay_domain::{
    BrokerCredentials, ExecutionRecord, ExecutionStatus, Position, PositionClose,
    PositionStatus, StrategyExecutionStatus, StrategySettings, Subscription, Timeframe,
};

#[derive(Clone, Default)]
pub struct InMemoryStore {
    strategies: Arc<DashMap<String, StrategySettings>>,
    execution_status: Arc<DashMap<String, StrategyExecutionStatus>>,
    subscriptions: Arc<DashMap<String, Subscription>>,
    credentials: Arc<DashMap<String, BrokerCredentials>>,
    positions: Arc<DashMap<String, Position>>,
    /// 序号 -> 记录，保持写入顺序
    records: Arc<DashMap<u64, ExecutionRecord>>,
    record_seq: Arc<AtomicU64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_strategy(&self, settings: StrategySettings) {
        self.strategies.insert(settings.id.clone(), settings);
    }

    pub fn put_subscription(&self, subscription: Subscription) {
        self.subscriptions.insert(subscription.id.clone(), subscription);
    }

    pub fn put_credentials(&self, credentials: BrokerCredentials) {
        self.credentials.insert(credentials.id.clone(), credentials);
    }

    /// 直接写入持仓（测试构造用）
    pub fn put_position(&self, position: Position) {
        self.positions.insert(position.id.clone(), position);
    }

    pub fn subscription(&self, subscription_id: &str) -> Option<Subscription> {
        self.subscriptions.get(subscription_id).map(|s| s.clone())
    }

    pub fn execution_status(&self, strategy_id: &str) -> Option<StrategyExecutionStatus> {
        self.execution_status.get(strategy_id).map(|s| s.clone())
    }

    /// 全部执行记录（按写入顺序）
    pub fn execution_records(&self) -> Vec<ExecutionRecord> {
        let mut records: Vec<(u64, ExecutionRecord)> = self
            .records
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();
        records.sort_by_key(|(seq, _)| *seq);
        records.into_iter().map(|(_, r)| r).collect()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.positions.iter().map(|p| p.value().clone()).collect()
    }

    pub fn positions_by_subscription(&self, subscription_id: &str) -> Vec<Position> {
        self.positions
            .iter()
            .filter(|p| p.subscription_id == subscription_id)
            .map(|p| p.value().clone())
            .collect()
    }
}

#[async_trait]
impl StrategySettingsRepository for InMemoryStore {
    async fn find_by_id(&self, strategy_id: &str) -> Result<Option<StrategySettings>> {
        Ok(self.strategies.get(strategy_id).map(|s| s.clone()))
    }

    async fn find_by_symbol_and_timeframe(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<StrategySettings>> {
        let mut found: Vec<StrategySettings> = self
            .strategies
            .iter()
            .filter(|s| s.is_active && s.symbol == symbol && s.timeframe == timeframe)
            .map(|s| s.value().clone())
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn update_execution_status(
        &self,
        strategy_id: &str,
        status: &StrategyExecutionStatus,
    ) -> Result<()> {
        self.execution_status
            .insert(strategy_id.to_string(), status.clone());
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryStore {
    async fn find_by_id(&self, subscription_id: &str) -> Result<Option<Subscription>> {
        Ok(self.subscription(subscription_id))
    }

    async fn find_active_by_strategy(&self, strategy_id: &str) -> Result<Vec<Subscription>> {
        let mut found: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|s| s.strategy_id == strategy_id && s.is_active)
            .map(|s| s.value().clone())
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn record_trade_opened(&self, subscription_id: &str) -> Result<()> {
        let mut sub = self
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| anyhow!("订阅不存在: {}", subscription_id))?;
        sub.total_trades += 1;
        Ok(())
    }

    async fn record_trade_closed(&self, subscription_id: &str, pnl: f64) -> Result<()> {
        let mut sub = self
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| anyhow!("订阅不存在: {}", subscription_id))?;
        sub.total_pnl += pnl;
        Ok(())
    }
}

#[async_trait]
impl BrokerCredentialsRepository for InMemoryStore {
    async fn find_by_id(&self, credentials_id: &str) -> Result<Option<BrokerCredentials>> {
        Ok(self.credentials.get(credentials_id).map(|c| c.clone()))
    }
}

#[async_trait]
impl PositionRepository for InMemoryStore {
    async fn insert(&self, position: &Position) -> Result<()> {
        match self.positions.entry(position.id.clone()) {
            Entry::Occupied(_) => Err(anyhow!("持仓已存在: {}", position.id)),
            Entry::Vacant(vacant) => {
                vacant.insert(position.clone());
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, position_id: &str) -> Result<Option<Position>> {
        Ok(self.positions.get(position_id).map(|p| p.clone()))
    }

    async fn find_open(&self) -> Result<Vec<Position>> {
        let mut open: Vec<Position> = self
            .positions
            .iter()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| p.value().clone())
            .collect();
        open.sort_by_key(|p| p.entry_time);
        Ok(open)
    }

    async fn count_open_by_subscription(&self, subscription_id: &str) -> Result<u32> {
        Ok(self
            .positions
            .iter()
            .filter(|p| p.subscription_id == subscription_id && p.status == PositionStatus::Open)
            .count() as u32)
    }

    async fn realized_pnl_since(
        &self,
        subscription_id: &str,
        since: DateTime<Utc>,
    ) -> Result<f64> {
        Ok(self
            .positions
            .iter()
            .filter(|p| p.subscription_id == subscription_id && p.status == PositionStatus::Closed)
            .filter(|p| p.exit_time.map(|t| t >= since).unwrap_or(false))
            .filter_map(|p| p.pnl)
            .sum())
    }

    async fn close_if_open(&self, position_id: &str, close: &PositionClose) -> Result<bool> {
        // get_mut 持有分片写锁，检查与更新原子
        let Some(mut position) = self.positions.get_mut(position_id) else {
            return Err(anyhow!("持仓不存在: {}", position_id));
        };
        if position.status != PositionStatus::Open {
            return Ok(false);
        }
        position.apply_close(close)?;
        Ok(true)
    }
}

#[async_trait]
impl ExecutionRecordRepository for InMemoryStore {
    async fn append(&self, record: &ExecutionRecord) -> Result<()> {
        let seq = self.record_seq.fetch_add(1, Ordering::SeqCst);
        self.records.insert(seq, record.clone());
        Ok(())
    }

    async fn latest_success_after(
        &self,
        strategy_id: &str,
        after: DateTime<Utc>,
    ) -> Result<Option<ExecutionRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| {
                r.strategy_id == strategy_id
                    && r.status == ExecutionStatus::Success
                    && r.executed_at > after
            })
            .max_by_key(|r| r.executed_at)
            .map(|r| r.value().clone()))
    }
}
