//! 服务依赖集合
//!
//! 执行协调器与持仓监控共享同一组协作者，由启动代码统一组装

use std::sync::Arc;

use quant_relay_domain::traits::{
    BrokerCredentialsRepository, BrokerGateway, EventPublisher, ExecutionLockStore,
    ExecutionRecordRepository, PositionRepository, SignalSource, StrategySettingsRepository,
    SubscriptionRepository,
};
use quant_relay_domain::{BrokerCredentials, Position};

#[derive(Clone)]
pub struct RelayContext {
    pub strategies: Arc<dyn StrategySettingsRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub credentials: Arc<dyn BrokerCredentialsRepository>,
    pub positions: Arc<dyn PositionRepository>,
    pub records: Arc<dyn ExecutionRecordRepository>,
    pub lock: Arc<dyn ExecutionLockStore>,
    pub signal_source: Arc<dyn SignalSource>,
    pub broker: Arc<dyn BrokerGateway>,
    pub publisher: Arc<dyn EventPublisher>,
}

impl RelayContext {
    /// 查找持仓所属订阅的券商凭证
    pub async fn credentials_for_position(
        &self,
        position: &Position,
    ) -> anyhow::Result<Option<BrokerCredentials>> {
        let subscription = match self.subscriptions.find_by_id(&position.subscription_id).await? {
            Some(s) => s,
            None => return Ok(None),
        };
        match subscription.broker_credentials_id {
            Some(id) => self.credentials.find_by_id(&id).await,
            None => Ok(None),
        }
    }
}
