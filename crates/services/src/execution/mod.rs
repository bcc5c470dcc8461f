//! 策略执行：执行锁、信号计算、订阅者扇出

pub mod execution_coordinator;

pub use execution_coordinator::{
    CoordinatorConfig, ExecutionCoordinator, ExecutionOutcome, ExecutionResult, SkipReason,
    SubscriberDecision,
};
