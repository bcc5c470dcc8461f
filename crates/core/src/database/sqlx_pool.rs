//! SQLx 数据库连接池管理

use once_cell::sync::OnceCell;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool};
use std::time::Duration;
use tracing::info;

use crate::error::{AppError, AppResult};

static DB_POOL: OnceCell<Pool<MySql>> = OnceCell::new();

/// 初始化数据库连接池
pub async fn init_db_pool(database_url: &str) -> AppResult<()> {
    info!("正在初始化数据库连接池...");

    let pool = MySqlPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .map_err(|e| AppError::DatabaseError(format!("数据库连接失败: {}", e)))?;

    DB_POOL
        .set(pool)
        .map_err(|_| AppError::DatabaseError("数据库连接池已初始化".to_string()))?;

    info!("✓ 数据库连接池初始化成功");
    Ok(())
}

/// 获取数据库连接池
pub fn get_db_pool() -> AppResult<&'static Pool<MySql>> {
    DB_POOL
        .get()
        .ok_or_else(|| AppError::DatabaseError("数据库连接池未初始化，请先调用 init_db_pool()".to_string()))
}

/// 关闭数据库连接池
pub async fn close_db_pool() -> AppResult<()> {
    if let Some(pool) = DB_POOL.get() {
        info!("正在关闭数据库连接池...");
        pool.close().await;
        info!("✓ 数据库连接池已关闭");
    }
    Ok(())
}

/// 健康检查
pub async fn health_check() -> AppResult<()> {
    let pool = get_db_pool()?;
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("数据库健康检查失败: {}", e)))?;
    Ok(())
}
