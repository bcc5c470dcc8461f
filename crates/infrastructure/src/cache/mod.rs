//! 缓存与分布式协调

pub mod execution_lock;

pub use execution_lock::{InMemoryExecutionLock, RedisExecutionLock};
