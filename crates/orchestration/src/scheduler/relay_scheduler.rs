//! 定时调度
//!
//! 每个配置的周期注册一个 cron 任务：K线收盘后分发该周期刚收盘的边界；
//! 另有一个固定间隔的持仓监控任务。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, info, warn};
use uuid::Uuid;

use quant_relay_domain::Timeframe;
use quant_relay_services::PositionSupervisor;

use crate::dispatcher::CandleCloseDispatcher;

/// 调度器错误类型
#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("调度器创建失败: {reason}")]
    CreationFailed { reason: String },

    #[error("任务创建失败: {reason}")]
    JobCreationFailed { reason: String },

    #[error("任务注册失败: {reason}")]
    JobRegistrationFailed { reason: String },

    #[error("调度器启动失败: {reason}")]
    StartFailed { reason: String },

    #[error("调度器关闭失败: {reason}")]
    ShutdownFailed { reason: String },
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 每个周期任务分发的交易对
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub monitor_interval: Duration,
    /// cron 相对收盘时刻的延后秒数，给行情落库留出时间
    pub cron_offset_secs: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            timeframes: Vec::new(),
            monitor_interval: Duration::from_secs(60),
            cron_offset_secs: 5,
        }
    }
}

/// 周期对应的 cron 表达式（秒 分 时 日 月 周）
pub fn cron_expression(timeframe: Timeframe, offset_secs: u32) -> String {
    let sec = offset_secs.min(59);
    match timeframe {
        Timeframe::M1 => format!("{} * * * * *", sec),
        Timeframe::M3 => format!("{} */3 * * * *", sec),
        Timeframe::M5 => format!("{} */5 * * * *", sec),
        Timeframe::M15 => format!("{} */15 * * * *", sec),
        Timeframe::M30 => format!("{} */30 * * * *", sec),
        Timeframe::H1 => format!("{} 0 * * * *", sec),
        Timeframe::H2 => format!("{} 0 */2 * * *", sec),
        Timeframe::H4 => format!("{} 0 */4 * * *", sec),
        Timeframe::H6 => format!("{} 0 */6 * * *", sec),
        Timeframe::H12 => format!("{} 0 */12 * * *", sec),
        Timeframe::D1 => format!("{} 0 0 * * *", sec),
        Timeframe::W1 => format!("{} 0 0 * * Mon", sec),
    }
}

pub struct RelayScheduler {
    scheduler: JobScheduler,
    job_ids: Vec<Uuid>,
    /// 置位后所有任务的新 tick 直接跳过
    stopping: Arc<AtomicBool>,
}

impl RelayScheduler {
    pub async fn new() -> Result<Self, SchedulerError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::CreationFailed {
                reason: e.to_string(),
            })?;
        Ok(Self {
            scheduler,
            job_ids: Vec::new(),
            stopping: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 已注册任务数
    pub fn job_count(&self) -> usize {
        self.job_ids.len()
    }

    /// 停止标志，关闭流程通过它让进行中的调度不再开始新工作
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopping)
    }

    /// 注册全部周期任务和持仓监控任务，返回注册数量
    pub async fn register(
        &mut self,
        config: &SchedulerConfig,
        dispatcher: Arc<CandleCloseDispatcher>,
        supervisor: Arc<PositionSupervisor>,
    ) -> Result<usize, SchedulerError> {
        if config.symbols.is_empty() {
            warn!("未配置交易对，周期任务不会分发任何策略");
        }

        for timeframe in &config.timeframes {
            let job = self.candle_close_job(
                *timeframe,
                config.cron_offset_secs,
                config.symbols.clone(),
                Arc::clone(&dispatcher),
            )?;
            self.add(job).await?;
        }

        let job = self.monitor_job(config.monitor_interval, supervisor)?;
        self.add(job).await?;

        info!(
            "📝 调度任务注册完成: 周期 {:?}, 交易对 {:?}, 监控间隔 {:?}",
            config
                .timeframes
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>(),
            config.symbols,
            config.monitor_interval
        );
        Ok(self.job_ids.len())
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| SchedulerError::StartFailed {
                reason: e.to_string(),
            })?;
        info!("✅ 调度器已启动，共 {} 个任务", self.job_ids.len());
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        self.stopping.store(true, Ordering::SeqCst);
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| SchedulerError::ShutdownFailed {
                reason: e.to_string(),
            })?;
        info!("调度器已关闭");
        Ok(())
    }

    async fn add(&mut self, job: Job) -> Result<(), SchedulerError> {
        let id = self
            .scheduler
            .add(job)
            .await
            .map_err(|e| SchedulerError::JobRegistrationFailed {
                reason: e.to_string(),
            })?;
        self.job_ids.push(id);
        Ok(())
    }

    fn candle_close_job(
        &self,
        timeframe: Timeframe,
        offset_secs: u32,
        symbols: Vec<String>,
        dispatcher: Arc<CandleCloseDispatcher>,
    ) -> Result<Job, SchedulerError> {
        let cron = cron_expression(timeframe, offset_secs);
        debug!("创建周期任务: timeframe={}, cron={}", timeframe, cron);
        let symbols = Arc::new(symbols);
        let stopping = Arc::clone(&self.stopping);

        Job::new_async(cron.as_str(), move |_uuid, _lock| {
            let symbols = Arc::clone(&symbols);
            let dispatcher = Arc::clone(&dispatcher);
            let stopping = Arc::clone(&stopping);
            Box::pin(async move {
                if stopping.load(Ordering::SeqCst) {
                    return;
                }
                let results = dispatcher
                    .dispatch_close(&symbols, timeframe, Utc::now())
                    .await;
                debug!(
                    "周期 {} 收盘分发完成，执行结果 {} 条",
                    timeframe,
                    results.len()
                );
            })
        })
        .map_err(|e| SchedulerError::JobCreationFailed {
            reason: format!("周期 {} 的 cron 任务: {}", timeframe, e),
        })
    }

    fn monitor_job(
        &self,
        every: Duration,
        supervisor: Arc<PositionSupervisor>,
    ) -> Result<Job, SchedulerError> {
        let stopping = Arc::clone(&self.stopping);
        // 上一轮监控未结束时跳过本轮，避免同一持仓被两个监控周期并发处理
        let running = Arc::new(AtomicBool::new(false));

        Job::new_repeated_async(every, move |_uuid, _lock| {
            let supervisor = Arc::clone(&supervisor);
            let stopping = Arc::clone(&stopping);
            let running = Arc::clone(&running);
            Box::pin(async move {
                if stopping.load(Ordering::SeqCst) {
                    return;
                }
                if running
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    debug!("上一轮持仓监控仍在运行，跳过");
                    return;
                }
                let summary = supervisor.monitor_all_open_trades().await;
                running.store(false, Ordering::SeqCst);
                debug!("持仓监控完成: {:?}", summary);
            })
        })
        .map_err(|e| SchedulerError::JobCreationFailed {
            reason: format!("持仓监控任务: {}", e),
        })
    }
}
