use once_cell::sync::OnceCell;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult};

/// Redis连接池管理器
pub struct RedisConnectionPool {
    client: Client,
}

impl RedisConnectionPool {
    /// 创建新的连接池
    pub async fn new(redis_url: &str) -> AppResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| AppError::CacheError(format!("Failed to create Redis client: {}", e)))?;

        // 测试连接
        let _test_conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!("Redis connection test failed: {}", redis_url);
                AppError::CacheError(format!("Failed to test Redis connection: {}", e))
            })?;

        debug!("Redis连接池初始化成功");

        Ok(Self { client })
    }

    /// 获取连接
    pub async fn get_connection(&self) -> AppResult<MultiplexedConnection> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::CacheError(format!("Failed to get multiplexed connection: {}", e)))?;
        Ok(conn)
    }
}

/// 全局Redis连接池实例
pub static REDIS_POOL: OnceCell<RedisConnectionPool> = OnceCell::new();

/// 初始化Redis连接池
pub async fn init_redis_pool(redis_url: &str) -> AppResult<()> {
    let pool = RedisConnectionPool::new(redis_url).await?;

    REDIS_POOL
        .set(pool)
        .map_err(|_| AppError::CacheError("Redis连接池已初始化".to_string()))?;

    info!("Redis connection pool initialized successfully ！");
    Ok(())
}

/// 获取Redis连接池实例
pub fn get_redis_pool() -> AppResult<&'static RedisConnectionPool> {
    REDIS_POOL
        .get()
        .ok_or_else(|| AppError::CacheError("Redis连接池未初始化，请先调用 init_redis_pool()".to_string()))
}

/// 获取Redis连接
pub async fn get_redis_connection() -> AppResult<MultiplexedConnection> {
    let pool = get_redis_pool()?;
    pool.get_connection().await
}

/// 清理Redis连接池
pub async fn cleanup_redis_pool() -> AppResult<()> {
    if get_redis_pool().is_ok() {
        info!("Redis连接池清理完成");
    }
    Ok(())
}

/// 策略执行锁的 key：`{prefix}:{strategy_id}:{interval_key}`
pub fn execution_lock_key(prefix: &str, strategy_id: &str, interval_key: &str) -> String {
    format!("{}:{}:{}", prefix, strategy_id, interval_key)
}
