//! 运行配置
//!
//! 所有配置来自环境变量（`.env` 通过 dotenv 加载）

use std::time::Duration;

use dotenv::dotenv;
use uuid::Uuid;

use super::environment::{env_f64, env_i64, env_list, env_or_default};

/// 执行核心运行配置
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub app_env: String,
    /// MySQL 连接串，未设置时使用内存存储
    pub database_url: Option<String>,
    pub redis_url: String,
    /// 写入执行锁和执行记录的 worker 标识
    pub worker_id: String,
    /// 信号进程硬超时
    pub signal_timeout: Duration,
    pub signal_command: String,
    pub signal_script_dir: String,
    /// 调度时间允许的偏差
    pub max_schedule_skew: Duration,
    /// 平台默认持仓时长（小时）
    pub default_hold_period_hours: f64,
    pub monitor_interval: Duration,
    pub execution_lock_prefix: String,
    pub event_channel: String,
    pub okx_base_url: String,
    /// 券商网关："okx" 或 "paper"
    pub broker_gateway: String,
    /// 调度器驱动的交易对
    pub symbols: Vec<String>,
    /// 调度器驱动的周期，如 ["5m", "1H"]
    pub timeframes: Vec<String>,
    /// cron 相对K线收盘的延后秒数
    pub cron_offset_secs: u32,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        dotenv().ok();

        let worker_id = std::env::var("WORKER_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| format!("worker-{}", Uuid::new_v4()));

        let app_env = env_or_default("APP_ENV", "local");
        let default_gateway = if app_env == "local" { "paper" } else { "okx" };

        Self {
            broker_gateway: env_or_default("BROKER_GATEWAY", default_gateway),
            app_env,
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            redis_url: env_or_default("REDIS_HOST", "redis://127.0.0.1:6379/"),
            worker_id,
            signal_timeout: Duration::from_secs(env_i64("SIGNAL_TIMEOUT_SECS", 30).max(1) as u64),
            signal_command: env_or_default("SIGNAL_COMMAND", "python3"),
            signal_script_dir: env_or_default("SIGNAL_SCRIPT_DIR", "./strategies"),
            max_schedule_skew: Duration::from_secs(
                env_i64("MAX_SCHEDULE_SKEW_SECS", 120).max(0) as u64,
            ),
            default_hold_period_hours: env_f64("DEFAULT_HOLD_PERIOD_HOURS", 24.0),
            monitor_interval: Duration::from_secs(
                env_i64("MONITOR_INTERVAL_SECS", 60).max(1) as u64,
            ),
            execution_lock_prefix: env_or_default("EXECUTION_LOCK_PREFIX", "strategy_exec_lock"),
            event_channel: env_or_default("EVENT_CHANNEL", "quant_relay:events"),
            okx_base_url: env_or_default("OKX_BASE_URL", "https://www.okx.com"),
            symbols: env_list("RELAY_SYMBOLS"),
            timeframes: env_list("RELAY_TIMEFRAMES"),
            cron_offset_secs: env_i64("STRATEGY_CRON_OFFSET_SEC", 5).clamp(0, 59) as u32,
        }
    }

    pub fn is_local(&self) -> bool {
        self.app_env == "local"
    }
}
