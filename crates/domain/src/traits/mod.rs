//! 领域接口模块
//!
//! 定义领域层的抽象接口，由基础设施层实现

pub mod coordination_trait;
pub mod exchange_trait;
pub mod repository_trait;

pub use coordination_trait::{EventPublisher, ExecutionLockStore, SignalSource};
pub use exchange_trait::{BrokerGateway, OrderPlacement, OrderRequest, OrderStatusReport};
pub use repository_trait::{
    BrokerCredentialsRepository, ExecutionRecordRepository, PositionRepository,
    StrategySettingsRepository, SubscriptionRepository,
};
