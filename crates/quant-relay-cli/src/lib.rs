//! # Quant Relay CLI
//!
//! 执行核心主程序入口：调度运行、单次执行、单次持仓监控

pub mod app;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use quant_relay_core::config::{ShutdownConfig, ShutdownManager};
use quant_relay_core::RelayConfig;
use quant_relay_orchestration::{CandleCloseDispatcher, RelayScheduler};
use quant_relay_services::{
    CoordinatorConfig, ExecutionCoordinator, PositionSupervisor, RelayContext, SupervisorConfig,
};

use app::{build_context, scheduler_config, Bootstrapped};

#[derive(Debug, Parser)]
#[command(name = "quant-relay", version, about = "多租户策略执行核心")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 启动调度器，直到收到 SIGINT/SIGTERM
    Run,
    /// 立即执行一次策略
    Execute {
        #[arg(long)]
        strategy_id: String,
        /// RFC3339 调度时间，默认当前时间
        #[arg(long, value_parser = parse_scheduled_time)]
        scheduled_time: Option<DateTime<Utc>>,
    },
    /// 执行一轮持仓监控
    Monitor,
}

fn parse_scheduled_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("无效的 RFC3339 时间 '{}': {}", value, e))
}

/// 应用初始化
pub fn app_init() -> Result<()> {
    // 加载环境变量
    dotenv().ok();

    // 设置日志
    quant_relay_core::logger::setup_logging()?;
    Ok(())
}

fn coordinator(ctx: RelayContext, config: &RelayConfig) -> ExecutionCoordinator {
    ExecutionCoordinator::new(
        ctx,
        CoordinatorConfig {
            worker_id: config.worker_id.clone(),
            signal_timeout: config.signal_timeout,
            max_schedule_skew: config.max_schedule_skew,
        },
    )
}

fn supervisor(ctx: RelayContext, config: &RelayConfig) -> PositionSupervisor {
    PositionSupervisor::new(
        ctx,
        SupervisorConfig {
            default_hold_period_hours: config.default_hold_period_hours,
            worker_id: config.worker_id.clone(),
            ..Default::default()
        },
    )
}

/// 运行主程序
pub async fn run(command: Command) -> Result<()> {
    let config = RelayConfig::from_env();
    info!(
        "🚀 启动 Quant Relay: env={}, worker={}",
        config.app_env, config.worker_id
    );
    let boot = build_context(&config).await?;

    match command {
        Command::Run => run_scheduler(&config, boot).await,
        Command::Execute {
            strategy_id,
            scheduled_time,
        } => {
            let scheduled_time = scheduled_time.unwrap_or_else(Utc::now);
            let result = coordinator(boot.ctx.clone(), &config)
                .execute_strategy(&strategy_id, scheduled_time)
                .await;
            info!("执行结果: {:?}", result);
            let outcome = if result.success || result.is_lock_contention() {
                Ok(())
            } else {
                Err(anyhow!(
                    "策略 {} 执行失败: {}",
                    strategy_id,
                    result.error.unwrap_or_default()
                ))
            };
            graceful_shutdown(&boot, None).await?;
            outcome
        }
        Command::Monitor => {
            let summary = supervisor(boot.ctx.clone(), &config)
                .monitor_all_open_trades()
                .await;
            info!("📝 持仓监控完成: {:?}", summary);
            graceful_shutdown(&boot, None).await
        }
    }
}

async fn run_scheduler(config: &RelayConfig, boot: Bootstrapped) -> Result<()> {
    let coordinator = Arc::new(coordinator(boot.ctx.clone(), config));
    let dispatcher = Arc::new(CandleCloseDispatcher::new(
        coordinator,
        boot.ctx.strategies.clone(),
    ));
    let supervisor = Arc::new(supervisor(boot.ctx.clone(), config));

    let mut scheduler = RelayScheduler::new().await?;
    scheduler
        .register(&scheduler_config(config)?, dispatcher, supervisor)
        .await?;
    scheduler.start().await?;

    // 等待关闭信号
    let signal = ShutdownManager::wait_for_shutdown_signal().await?;
    info!("收到关闭信号: {}", signal);

    graceful_shutdown(&boot, Some(scheduler)).await
}

/// 优雅关闭：调度器 -> 数据库 -> Redis
pub async fn graceful_shutdown(
    boot: &Bootstrapped,
    scheduler: Option<RelayScheduler>,
) -> Result<()> {
    let manager = ShutdownManager::new(ShutdownConfig {
        total_timeout: Duration::from_secs(30),
        hook_timeout: Duration::from_secs(10),
    });

    // 1) 关闭调度器
    if let Some(scheduler) = scheduler {
        scheduler.stop_handle().store(true, Ordering::SeqCst);
        let scheduler = Arc::new(Mutex::new(scheduler));
        manager
            .register_shutdown_hook("scheduler_shutdown", move || {
                let scheduler = Arc::clone(&scheduler);
                async move {
                    scheduler.lock().await.shutdown().await?;
                    Ok::<(), anyhow::Error>(())
                }
            })
            .await;
    }

    // 2) 关闭数据库
    if boot.database_enabled {
        manager
            .register_shutdown_hook("db_cleanup", || async {
                quant_relay_core::database::close_db_pool().await?;
                Ok::<(), anyhow::Error>(())
            })
            .await;
    }

    // 3) 关闭 Redis
    if boot.redis_enabled {
        manager
            .register_shutdown_hook("redis_cleanup", || async {
                if let Err(e) = quant_relay_core::cache::cleanup_redis_pool().await {
                    error!("清理 Redis 连接池失败: {}", e);
                }
                Ok(())
            })
            .await;
    }

    if let Err(e) = manager.shutdown().await {
        warn!("优雅关闭未完成: {}", e);
        return Err(e);
    }
    Ok(())
}
