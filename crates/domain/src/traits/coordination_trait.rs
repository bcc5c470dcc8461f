//! 执行协调相关接口：执行锁、信号源、事件发布

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::entities::RelayEvent;
use crate::value_objects::{SignalRequest, SignalResponse};

/// 执行锁存储
///
/// 必须是原子的带 TTL 条件写入；获取失败立即返回 false，不阻塞等待。
/// 策略执行锁不会被显式释放，TTL 到期是唯一的释放方式
#[async_trait]
pub trait ExecutionLockStore: Send + Sync {
    async fn try_acquire(
        &self,
        strategy_id: &str,
        interval_key: &str,
        worker_id: &str,
        ttl: Duration,
    ) -> Result<bool>;

    /// 仅当持有者是 `worker_id` 时删除锁，返回是否删除
    ///
    /// 只用于平仓租约：尚未产生券商副作用时提前让出
    async fn release(&self, scope: &str, key: &str, worker_id: &str) -> Result<bool>;
}

/// 外部信号源
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn evaluate(&self, request: &SignalRequest) -> Result<SignalResponse>;
}

/// 事件发布（fire-and-forget，失败不影响主流程）
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: RelayEvent);
}
