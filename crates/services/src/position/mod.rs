//! 持仓监控：止损止盈成交、持仓到期、反向信号

pub mod position_supervisor;

pub use position_supervisor::{MonitorSummary, PositionSupervisor, SupervisorConfig};
