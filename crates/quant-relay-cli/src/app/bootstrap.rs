//! # 应用启动引导模块
//!
//! 按配置组装执行核心的协作者：存储、执行锁、信号源、券商网关、事件发布

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use quant_relay_core::cache::init_redis_pool;
use quant_relay_core::database::{get_db_pool, init_db_pool};
use quant_relay_core::RelayConfig;
use quant_relay_domain::traits::ExecutionLockStore;
use quant_relay_domain::Timeframe;
use quant_relay_infrastructure::repositories::{
    SqlxBrokerCredentialsRepository, SqlxExecutionRecordRepository, SqlxPositionRepository,
    SqlxStrategySettingsRepository, SqlxSubscriptionRepository,
};
use quant_relay_infrastructure::{
    BrokerGatewayFactory, FanoutPublisher, InMemoryExecutionLock, InMemoryStore,
    ProcessSignalSource, RedisEventPublisher, RedisExecutionLock, TracingEventPublisher,
};
use quant_relay_orchestration::SchedulerConfig;
use quant_relay_services::{RelayContext, TelegramNotifier};

/// 组装结果，关闭流程据此决定需要清理哪些连接池
pub struct Bootstrapped {
    pub ctx: RelayContext,
    pub database_enabled: bool,
    pub redis_enabled: bool,
}

pub async fn build_context(config: &RelayConfig) -> Result<Bootstrapped> {
    let signal_source = Arc::new(ProcessSignalSource::new(
        config.signal_command.clone(),
        config.signal_script_dir.clone(),
        config.signal_timeout,
    ));
    let broker = BrokerGatewayFactory::create(&config.broker_gateway, &config.okx_base_url)?;
    info!("券商网关: {}", broker.name());

    let redis_enabled = match init_redis_pool(&config.redis_url).await {
        Ok(()) => true,
        Err(e) if config.is_local() => {
            warn!("Redis 不可用，本地环境降级为进程内执行锁: {}", e);
            false
        }
        Err(e) => return Err(anyhow!("Redis 初始化失败: {}", e)),
    };
    let lock: Arc<dyn ExecutionLockStore> = if redis_enabled {
        Arc::new(RedisExecutionLock::new(config.execution_lock_prefix.clone()))
    } else {
        Arc::new(InMemoryExecutionLock::new())
    };

    let mut publisher = FanoutPublisher::new().with(Arc::new(TracingEventPublisher));
    if redis_enabled {
        publisher = publisher.with(Arc::new(RedisEventPublisher::new(
            config.event_channel.clone(),
        )));
    }
    match TelegramNotifier::from_env() {
        Ok(notifier) => publisher = publisher.with(Arc::new(notifier)),
        Err(e) => info!("Telegram 通知未启用: {}", e),
    }

    let ctx = match &config.database_url {
        Some(url) => {
            init_db_pool(url).await?;
            let pool = get_db_pool()?.clone();
            RelayContext {
                strategies: Arc::new(SqlxStrategySettingsRepository::new(pool.clone())),
                subscriptions: Arc::new(SqlxSubscriptionRepository::new(pool.clone())),
                credentials: Arc::new(SqlxBrokerCredentialsRepository::new(pool.clone())),
                positions: Arc::new(SqlxPositionRepository::new(pool.clone())),
                records: Arc::new(SqlxExecutionRecordRepository::new(pool)),
                lock,
                signal_source,
                broker,
                publisher: Arc::new(publisher),
            }
        }
        None => {
            if !config.is_local() {
                return Err(anyhow!("非本地环境必须配置 DATABASE_URL"));
            }
            warn!("未配置 DATABASE_URL，使用内存存储（进程退出后数据丢失）");
            let store = InMemoryStore::new();
            RelayContext {
                strategies: Arc::new(store.clone()),
                subscriptions: Arc::new(store.clone()),
                credentials: Arc::new(store.clone()),
                positions: Arc::new(store.clone()),
                records: Arc::new(store),
                lock,
                signal_source,
                broker,
                publisher: Arc::new(publisher),
            }
        }
    };

    Ok(Bootstrapped {
        ctx,
        database_enabled: config.database_url.is_some(),
        redis_enabled,
    })
}

/// 解析周期配置，去重并保持稳定顺序
pub fn parse_timeframes(values: &[String]) -> Result<Vec<Timeframe>> {
    let mut seen = BTreeSet::new();
    let mut timeframes = Vec::new();
    for value in values {
        let timeframe: Timeframe = value
            .trim()
            .parse()
            .map_err(|e| anyhow!("无效的周期配置 '{}': {}", value, e))?;
        if seen.insert(timeframe.as_str()) {
            timeframes.push(timeframe);
        }
    }
    Ok(timeframes)
}

fn dedup_strings(values: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && seen.insert(v.to_string()))
        .map(|v| v.to_string())
        .collect()
}

pub fn scheduler_config(config: &RelayConfig) -> Result<SchedulerConfig> {
    Ok(SchedulerConfig {
        symbols: dedup_strings(&config.symbols),
        timeframes: parse_timeframes(&config.timeframes)?,
        monitor_interval: config.monitor_interval.max(Duration::from_secs(1)),
        cron_offset_secs: config.cron_offset_secs,
    })
}
