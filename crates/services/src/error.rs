//! 服务层错误类型

use std::time::Duration;

use thiserror::Error;

use quant_relay_domain::PositionError;

/// 策略执行错误
///
/// 只在 `ExecutionCoordinator` 内部流转，最终都会转换为 `ExecutionResult`
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("策略不存在: {0}")]
    StrategyNotFound(String),

    #[error("信号源超时 ({0:?})")]
    SignalTimeout(Duration),

    #[error("信号源执行失败: {0}")]
    SignalFailed(String),

    #[error("存储访问失败: {0}")]
    Store(String),

    #[error("执行过程异常终止: {0}")]
    Panicked(String),
}

impl ExecutionError {
    pub fn store(err: anyhow::Error) -> Self {
        ExecutionError::Store(format!("{:#}", err))
    }

    /// 是否属于信号源（上游）失败
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ExecutionError::SignalTimeout(_) | ExecutionError::SignalFailed(_)
        )
    }
}

/// 平仓错误
#[derive(Error, Debug)]
pub enum CloseError {
    #[error("持仓 {0} 缺少券商凭证，无法平仓")]
    MissingCredentials(String),

    #[error("券商下单失败: {0}")]
    Broker(String),

    #[error("存储访问失败: {0}")]
    Store(String),

    #[error(transparent)]
    Position(#[from] PositionError),
}

impl CloseError {
    pub fn store(err: anyhow::Error) -> Self {
        CloseError::Store(format!("{:#}", err))
    }
}
