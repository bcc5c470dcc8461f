//! 业务实体模块
//!
//! 实体是具有唯一标识的领域对象，通常作为聚合根

pub mod broker_credentials;
pub mod event;
pub mod execution_record;
pub mod position;
pub mod strategy_settings;
pub mod subscription;

pub use broker_credentials::BrokerCredentials;
pub use event::{EventEnvelope, RelayEvent};
pub use execution_record::ExecutionRecord;
pub use position::{
    calculate_pnl, calculate_pnl_percent, OrderRole, Position, PositionClose, PositionError,
    PositionMetadata,
};
pub use strategy_settings::{StrategyExecutionStatus, StrategySettings};
pub use subscription::{SubscriberSettings, Subscription};
