//! 事件发布实现
//!
//! 发布失败只记录日志，不向调用方返回错误

use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{error, info, warn};

use quant_relay_core::cache::get_redis_connection;
use quant_relay_domain::entities::EventEnvelope;
use quant_relay_domain::traits::EventPublisher;
use quant_relay_domain::RelayEvent;

/// 写入日志的事件发布器
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventPublisher;

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, event: RelayEvent) {
        match &event {
            RelayEvent::ExecutionFailed {
                strategy_id, error, ..
            } => {
                error!(event = event.name(), strategy_id = %strategy_id, "策略执行失败: {}", error);
            }
            _ => match serde_json::to_string(&event) {
                Ok(payload) => info!(event = event.name(), "{}", payload),
                Err(e) => warn!("事件序列化失败: {}", e),
            },
        }
    }
}

/// Redis Pub/Sub 事件发布器
pub struct RedisEventPublisher {
    channel: String,
}

impl RedisEventPublisher {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    async fn try_publish(&self, event: RelayEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&EventEnvelope::now(event))?;
        let mut conn = get_redis_connection().await?;
        let _receivers: i64 = conn.publish(&self.channel, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(&self, event: RelayEvent) {
        let name = event.name();
        if let Err(e) = self.try_publish(event).await {
            warn!("Redis 事件发布失败 channel={} event={}: {}", self.channel, name, e);
        }
    }
}

/// 组合多个发布器，依次发布
#[derive(Clone, Default)]
pub struct FanoutPublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl FanoutPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

#[async_trait]
impl EventPublisher for FanoutPublisher {
    async fn publish(&self, event: RelayEvent) {
        for publisher in &self.publishers {
            publisher.publish(event.clone()).await;
        }
    }
}
