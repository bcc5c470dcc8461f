//! 缓存管理

pub mod redis_client;

// 重新导出
pub use redis_client::{
    cleanup_redis_pool, execution_lock_key, get_redis_connection, get_redis_pool,
    init_redis_pool,
};
