//! # Quant Relay Orchestration
//!
//! 编排层：K线收盘分发、周期调度、持仓监控定时器

pub mod dispatcher;
pub mod scheduler;

pub use dispatcher::CandleCloseDispatcher;
pub use scheduler::{RelayScheduler, SchedulerConfig, SchedulerError};
