//! 业务枚举模块

pub mod order_enums;
pub mod strategy_enums;

pub use order_enums::{ExitReason, OrderSide, OrderStatus, OrderType, PositionSide, PositionStatus};
pub use strategy_enums::{ExecutionStatus, SignalType, Timeframe};
