//! 数据访问层模块
//!
//! 实现 domain 层定义的 Repository 接口

pub mod broker_credentials_repository;
pub mod execution_record_repository;
pub mod in_memory_store;
pub mod position_repository;
pub mod strategy_settings_repository;
pub mod subscription_repository;

pub use broker_credentials_repository::{BrokerCredentialsEntity, SqlxBrokerCredentialsRepository};
pub use execution_record_repository::{ExecutionRecordEntity, SqlxExecutionRecordRepository};
pub use in_memory_store::InMemoryStore;
pub use position_repository::{PositionEntity, SqlxPositionRepository};
pub use strategy_settings_repository::{SqlxStrategySettingsRepository, StrategySettingsEntity};
pub use subscription_repository::{SqlxSubscriptionRepository, SubscriptionEntity};
