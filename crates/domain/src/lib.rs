//! # Quant Relay Domain
//!
//! 领域模型层 - 纯粹的业务逻辑，不依赖任何基础设施
//!
//! ## 模块组织
//!
//! - `entities`: 业务实体，如 Position, Subscription, ExecutionRecord
//! - `value_objects`: 值对象，如 Signal
//! - `enums`: 业务枚举，如 Timeframe, SignalType, ExitReason
//! - `policies`: 仓位计算、订阅者限额等纯计算
//! - `traits`: 领域接口，由基础设施层实现
//!
//! ## 使用示例
//!
//! ```rust
//! use quant_relay_domain::policies::calculate_position_size;
//!
//! // 资金 10000，单笔风险 2%，入场 100，止损 95，杠杆 1
//! let size = calculate_position_size(10_000.0, 0.02, 100.0, Some(95.0), 1.0);
//! assert!((size - 40.0).abs() < 1e-9);
//! ```

pub mod entities;
pub mod enums;
pub mod policies;
pub mod traits;
pub mod value_objects;

// 重新导出核心类型
pub use entities::{
    BrokerCredentials, ExecutionRecord, Position, PositionClose, PositionError, PositionMetadata,
    RelayEvent, StrategyExecutionStatus, StrategySettings, SubscriberSettings, Subscription,
};
pub use enums::{
    ExecutionStatus, ExitReason, OrderSide, OrderStatus, PositionSide, PositionStatus, SignalType,
    Timeframe,
};
pub use value_objects::{Signal, SignalRequest, SignalResponse};
