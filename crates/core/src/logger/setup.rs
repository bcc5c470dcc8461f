use std::env;
use std::sync::OnceLock;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::error::{AppError, AppResult};

// 全局变量用于保持日志文件句柄
static INFO_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static ERROR_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

// 日志配置结构体
#[derive(Debug, Clone)]
struct LogConfig {
    app_env: String,
    log_level: String,
    log_dir: String,
    log_rotation: String,
    info_file_name: String,
    error_file_name: String,
    enable_console_logging: bool,
    json_format: bool,
}

impl LogConfig {
    fn from_env() -> Self {
        Self {
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "local".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "log_files".to_string()),
            log_rotation: env::var("LOG_ROTATION").unwrap_or_else(|_| "daily".to_string()),
            info_file_name: env::var("LOG_INFO_FILE").unwrap_or_else(|_| "info.log".to_string()),
            error_file_name: env::var("LOG_ERROR_FILE")
                .unwrap_or_else(|_| "error.log".to_string()),
            enable_console_logging: env::var("ENABLE_CONSOLE_LOGGING")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            json_format: env::var("LOG_JSON")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
        }
    }
}

// 解析时间轮转策略
fn parse_rotation(s: &str) -> Rotation {
    match s.to_lowercase().as_str() {
        "minutely" | "minute" | "min" => Rotation::MINUTELY,
        "hourly" | "hour" | "hr" => Rotation::HOURLY,
        "daily" | "day" => Rotation::DAILY,
        _ => Rotation::DAILY,
    }
}

fn set_global<S>(subscriber: S) -> AppResult<()>
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::ConfigError(format!("设置日志订阅者失败: {}", e)))
}

// 设置日志
pub fn setup_logging() -> AppResult<()> {
    let config = LogConfig::from_env();

    // 本地环境：仅控制台输出
    if config.app_env == "local" {
        let console = fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stdout)
            .with_filter(EnvFilter::new(&config.log_level));
        set_global(Registry::default().with(console))?;

        info!("Log configuration setup successfully!");
        info!(
            "Environment: {}, Log Level: {}, File Logging: false",
            config.app_env, config.log_level
        );
        return Ok(());
    }

    // 非本地环境：文件输出（可选控制台）
    std::fs::create_dir_all(&config.log_dir)?;

    let info_file = RollingFileAppender::new(
        parse_rotation(&config.log_rotation),
        &config.log_dir,
        &config.info_file_name,
    );
    let error_file = RollingFileAppender::new(
        parse_rotation(&config.log_rotation),
        &config.log_dir,
        &config.error_file_name,
    );

    let (info_non_blocking, info_guard) = tracing_appender::non_blocking(info_file);
    let (error_non_blocking, error_guard) = tracing_appender::non_blocking(error_file);

    // 保存guard到全局，防止被丢弃
    INFO_GUARD
        .set(info_guard)
        .map_err(|_| AppError::ConfigError("Failed to set INFO_GUARD".to_string()))?;
    ERROR_GUARD
        .set(error_guard)
        .map_err(|_| AppError::ConfigError("Failed to set ERROR_GUARD".to_string()))?;

    let info_layer = if config.json_format {
        fmt::layer()
            .json()
            .with_writer(info_non_blocking)
            .with_filter(EnvFilter::new(&config.log_level))
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(info_non_blocking)
            .with_filter(EnvFilter::new(&config.log_level))
            .boxed()
    };

    let error_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(error_non_blocking)
        .with_filter(EnvFilter::new("error"))
        .boxed();

    let console_layer = config.enable_console_logging.then(|| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(std::io::stdout)
            .with_filter(EnvFilter::new(&config.log_level))
            .boxed()
    });

    set_global(
        Registry::default()
            .with(info_layer)
            .with(error_layer)
            .with(console_layer),
    )?;

    info!("Log configuration setup successfully!");
    info!(
        "Environment: {}, Log Level: {}, File Logging: true, Console Logging: {}",
        config.app_env, config.log_level, config.enable_console_logging
    );
    Ok(())
}
