// 错误处理模块

pub use thiserror::Error;

/// 启动期错误：配置、连接池、日志初始化
///
/// 运行期的业务错误由各层自己的错误类型表达
#[derive(Debug, Error)]
pub enum AppError {
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("Redis 错误: {0}")]
    CacheError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::CacheError(e.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::DatabaseError(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
