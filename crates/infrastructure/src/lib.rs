//! # Quant Relay Infrastructure
//!
//! 基础设施层 - 实现领域层定义的接口
//!
//! ## 职责
//!
//! 1. **数据访问**: 实现 Repository 接口，MySQL (sqlx) 与内存存储
//! 2. **分布式协调**: Redis 执行锁
//! 3. **消息传递**: 事件发布、Pub/Sub
//! 4. **外部服务**: 券商网关、信号子进程
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use quant_relay_infrastructure::repositories::SqlxPositionRepository;
//! use quant_relay_domain::traits::PositionRepository;
//!
//! let repo = SqlxPositionRepository::new(db_pool);
//! let open = repo.find_open().await?;
//! ```

pub mod cache;
pub mod exchanges;
pub mod messaging;
pub mod repositories;
pub mod signal;

// 重新导出常用类型
pub use cache::{InMemoryExecutionLock, RedisExecutionLock};
pub use exchanges::{BrokerGatewayFactory, OkxBrokerGateway, PaperBrokerGateway};
pub use messaging::{FanoutPublisher, RedisEventPublisher, TracingEventPublisher};
pub use repositories::InMemoryStore;
pub use signal::ProcessSignalSource;
