//! # Quant Relay Services
//!
//! 应用服务层 - 协调领域对象和基础设施，实现执行核心的业务流程
//!
//! ## 职责
//!
//! 1. **策略执行**: 每个周期只计算一次信号，扇出到所有订阅者
//! 2. **持仓监控**: 止损止盈成交、持仓到期、反向信号三类退出条件
//! 3. **通知**: 执行失败与开平仓推送
//!
//! ## 架构位置
//!
//! ```text
//! orchestration (调度) → services (业务协调) → domain + infrastructure
//! ```
//!
//! ## 设计原则
//!
//! 1. **依赖注入**: 所有协作者通过 `RelayContext` 注入，测试时替换为 Mock
//! 2. **失败隔离**: 单个订阅者或单个持仓的失败不影响其他任务
//! 3. **结构化结果**: `execute_strategy` 不返回错误，只返回 `ExecutionResult`
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use quant_relay_services::execution::{CoordinatorConfig, ExecutionCoordinator};
//!
//! let coordinator = ExecutionCoordinator::new(ctx, CoordinatorConfig::default());
//! let result = coordinator.execute_strategy("vegas_btc", scheduled_time).await;
//! ```

pub mod context;
pub mod error;
pub mod execution;
pub mod notification;
pub mod position;

#[cfg(test)]
pub(crate) mod test_support;

use std::any::Any;

// 重新导出常用服务
pub use context::RelayContext;
pub use error::{CloseError, ExecutionError};
pub use execution::{CoordinatorConfig, ExecutionCoordinator, ExecutionOutcome, ExecutionResult};
pub use notification::TelegramNotifier;
pub use position::{MonitorSummary, PositionSupervisor, SupervisorConfig};

/// 从 panic 负载中取出消息
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
