// 调度器模块
pub mod relay_scheduler;

pub use relay_scheduler::{cron_expression, RelayScheduler, SchedulerConfig, SchedulerError};
