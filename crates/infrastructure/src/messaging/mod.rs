//! 事件发布（Pub/Sub）

pub mod event_publisher;

pub use event_publisher::{FanoutPublisher, RedisEventPublisher, TracingEventPublisher};
