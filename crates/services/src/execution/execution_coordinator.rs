//! 策略执行协调器
//!
//! 每个 (策略, 周期) 只计算一次信号，再把同一个信号独立地应用到每个订阅者。
//!
//! 流程：
//! 1. 校验调度时间偏差（只记录日志）
//! 2. 根据周期计算 interval key，获取带 TTL 的执行锁
//! 3. 加载有效订阅，无订阅时直接记录 SKIPPED，不调用信号源
//! 4. 带超时调用信号源
//! 5. 并发扇出到所有订阅者，单个订阅者失败不影响其他订阅者
//! 6. 写入执行记录、更新策略执行状态、发布事件

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use quant_relay_domain::policies::{calculate_position_size, check_subscriber_limits, LimitDecision};
use quant_relay_domain::traits::{OrderPlacement, OrderRequest};
use quant_relay_domain::{
    BrokerCredentials, ExecutionRecord, ExecutionStatus, Position, PositionMetadata,
    PositionSide, RelayEvent, Signal, SignalRequest, SignalType, StrategyExecutionStatus,
    StrategySettings, Subscription, Timeframe,
};

use crate::context::RelayContext;
use crate::error::ExecutionError;
use crate::panic_message;

/// 信号返回后留给分发和写记录的时间
const FAN_OUT_MARGIN: Duration = Duration::from_secs(90);

/// 协调器配置
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// 写入执行锁和执行记录的 worker 标识
    pub worker_id: String,
    /// 信号源硬超时
    pub signal_timeout: Duration,
    /// 调度时间允许的偏差，超出只告警
    pub max_schedule_skew: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker-local".to_string(),
            signal_timeout: Duration::from_secs(30),
            max_schedule_skew: Duration::from_secs(120),
        }
    }
}

/// 执行结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// 本 worker 执行了该周期并写入了执行记录
    Executed(ExecutionStatus),
    /// 其他 worker 已持有该周期的执行锁
    LockNotAcquired,
    /// 未处理错误导致执行中止
    Aborted,
}

/// `execute_strategy` 的返回值，调用方永远拿到结构化结果
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub success: bool,
    pub outcome: ExecutionOutcome,
    pub strategy_id: String,
    pub interval_key: Option<String>,
    pub signal_type: Option<SignalType>,
    pub subscribers_count: u32,
    pub trades_generated: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl ExecutionResult {
    fn from_record(record: &ExecutionRecord) -> Self {
        Self {
            success: record.status != ExecutionStatus::Failed,
            outcome: ExecutionOutcome::Executed(record.status),
            strategy_id: record.strategy_id.clone(),
            interval_key: Some(record.interval_key.clone()),
            signal_type: record.signal_type,
            subscribers_count: record.subscribers_count,
            trades_generated: record.trades_generated,
            duration_ms: record.duration_ms,
            error: record.error.clone(),
        }
    }

    fn lock_not_acquired(strategy_id: &str, interval_key: String, started: Instant) -> Self {
        Self {
            success: false,
            outcome: ExecutionOutcome::LockNotAcquired,
            strategy_id: strategy_id.to_string(),
            interval_key: Some(interval_key),
            signal_type: None,
            subscribers_count: 0,
            trades_generated: 0,
            duration_ms: elapsed_ms(started),
            error: Some("执行锁已被其他 worker 持有".to_string()),
        }
    }

    fn aborted(
        strategy_id: &str,
        interval_key: Option<String>,
        started: Instant,
        error: String,
    ) -> Self {
        Self {
            success: false,
            outcome: ExecutionOutcome::Aborted,
            strategy_id: strategy_id.to_string(),
            interval_key,
            signal_type: None,
            subscribers_count: 0,
            trades_generated: 0,
            duration_ms: elapsed_ms(started),
            error: Some(error),
        }
    }

    /// 是否因为执行锁被占用而跳过
    pub fn is_lock_contention(&self) -> bool {
        self.outcome == ExecutionOutcome::LockNotAcquired
    }

    pub fn status(&self) -> Option<ExecutionStatus> {
        match self.outcome {
            ExecutionOutcome::Executed(status) => Some(status),
            _ => None,
        }
    }
}

/// 订阅者跳过原因
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// 订阅已暂停或停用
    NotTradable,
    /// 风控参数缺失或停用
    MissingSettings,
    /// 非开仓信号（HOLD / EXIT_*）
    NoEntrySignal(SignalType),
    LimitReached(LimitDecision),
    ZeroSize,
    MissingCredentials,
    BrokerRejected(String),
}

impl SkipReason {
    /// 需要以 warn 级别记录的跳过原因
    fn is_warning(&self) -> bool {
        !matches!(
            self,
            SkipReason::NotTradable | SkipReason::NoEntrySignal(_)
        )
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotTradable => write!(f, "订阅已暂停或停用"),
            SkipReason::MissingSettings => write!(f, "风控参数缺失或停用"),
            SkipReason::NoEntrySignal(signal) => write!(f, "非开仓信号 {}", signal),
            SkipReason::LimitReached(LimitDecision::MaxPositionsReached { open, max }) => {
                write!(f, "持仓数已达上限 {}/{}", open, max)
            }
            SkipReason::LimitReached(LimitDecision::DailyLossExceeded { realized, max }) => {
                write!(f, "当日亏损 {:.2} 超过上限 {:.2}", realized, max)
            }
            SkipReason::LimitReached(LimitDecision::Allowed) => write!(f, "风控限额"),
            SkipReason::ZeroSize => write!(f, "计算仓位为 0"),
            SkipReason::MissingCredentials => write!(f, "缺少券商凭证"),
            SkipReason::BrokerRejected(msg) => write!(f, "券商下单失败: {}", msg),
        }
    }
}

/// 单个订阅者的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriberDecision {
    Opened { position_id: String },
    Skipped(SkipReason),
}

pub struct ExecutionCoordinator {
    ctx: RelayContext,
    config: CoordinatorConfig,
}

impl ExecutionCoordinator {
    pub fn new(ctx: RelayContext, config: CoordinatorConfig) -> Self {
        Self { ctx, config }
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// 以本进程的 worker 身份执行策略
    pub async fn execute_strategy(
        &self,
        strategy_id: &str,
        scheduled_time: DateTime<Utc>,
    ) -> ExecutionResult {
        let worker_id = self.config.worker_id.clone();
        self.execute_strategy_as(strategy_id, scheduled_time, &worker_id)
            .await
    }

    /// 执行策略，永远不会返回错误或 panic 到调用方
    pub async fn execute_strategy_as(
        &self,
        strategy_id: &str,
        scheduled_time: DateTime<Utc>,
        worker_id: &str,
    ) -> ExecutionResult {
        let started = Instant::now();
        // 只有拿到执行锁之后才会写入，失败时据此决定是否补写 FAILED 记录
        let mut locked_key: Option<String> = None;

        let run = AssertUnwindSafe(self.run(
            strategy_id,
            scheduled_time,
            worker_id,
            started,
            &mut locked_key,
        ))
        .catch_unwind()
        .await;

        let err = match run {
            Ok(Ok(result)) => return result,
            Ok(Err(e)) => e,
            Err(panic) => ExecutionError::Panicked(panic_message(panic.as_ref())),
        };
        self.abort(strategy_id, locked_key, worker_id, started, err)
            .await
    }

    async fn run(
        &self,
        strategy_id: &str,
        scheduled_time: DateTime<Utc>,
        worker_id: &str,
        started: Instant,
        locked_key: &mut Option<String>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let settings = self
            .ctx
            .strategies
            .find_by_id(strategy_id)
            .await
            .map_err(ExecutionError::store)?
            .ok_or_else(|| ExecutionError::StrategyNotFound(strategy_id.to_string()))?;

        self.check_schedule_skew(strategy_id, scheduled_time);

        let interval_key = settings.timeframe.interval_key(scheduled_time);
        let ttl = self.lock_ttl(settings.timeframe);
        let acquired = self
            .ctx
            .lock
            .try_acquire(strategy_id, &interval_key, worker_id, ttl)
            .await
            .map_err(ExecutionError::store)?;
        if !acquired {
            info!(
                strategy_id,
                interval_key = %interval_key,
                worker_id,
                "执行锁已被其他 worker 持有，跳过本周期"
            );
            return Ok(ExecutionResult::lock_not_acquired(
                strategy_id,
                interval_key,
                started,
            ));
        }
        *locked_key = Some(interval_key.clone());

        if !settings.is_active {
            info!(strategy_id, interval_key = %interval_key, "策略已停用，跳过");
            let record =
                ExecutionRecord::new(strategy_id, &interval_key, worker_id, ExecutionStatus::Skipped)
                    .with_error("策略已停用")
                    .with_duration(elapsed_ms(started));
            return self.finish(record).await;
        }

        let subscriptions = self
            .ctx
            .subscriptions
            .find_active_by_strategy(strategy_id)
            .await
            .map_err(ExecutionError::store)?;
        let subscribers_count = subscriptions.len() as u32;

        if subscriptions.is_empty() {
            info!(strategy_id, interval_key = %interval_key, "无有效订阅，不调用信号源");
            let record =
                ExecutionRecord::new(strategy_id, &interval_key, worker_id, ExecutionStatus::Skipped)
                    .with_duration(elapsed_ms(started));
            return self.finish(record).await;
        }

        self.ctx
            .publisher
            .publish(RelayEvent::ExecutionStarted {
                strategy_id: strategy_id.to_string(),
                interval_key: interval_key.clone(),
                worker_id: worker_id.to_string(),
                subscribers_count,
            })
            .await;

        let signal = match self.evaluate_signal(&settings, scheduled_time).await {
            Ok(Some(signal)) => signal,
            Ok(None) => {
                info!(strategy_id, interval_key = %interval_key, "信号源未返回信号");
                let record = ExecutionRecord::new(
                    strategy_id,
                    &interval_key,
                    worker_id,
                    ExecutionStatus::NoSignal,
                )
                .with_counts(subscribers_count, 0)
                .with_duration(elapsed_ms(started));
                return self.finish(record).await;
            }
            Err(e) => {
                error!(strategy_id, interval_key = %interval_key, "❌ 信号计算失败: {}", e);
                let record =
                    ExecutionRecord::new(strategy_id, &interval_key, worker_id, ExecutionStatus::Failed)
                        .with_counts(subscribers_count, 0)
                        .with_duration(elapsed_ms(started))
                        .with_error(e.to_string());
                let result = self.finish(record).await?;
                self.ctx
                    .publisher
                    .publish(RelayEvent::ExecutionFailed {
                        strategy_id: strategy_id.to_string(),
                        interval_key: Some(interval_key),
                        error: e.to_string(),
                    })
                    .await;
                return Ok(result);
            }
        };

        info!(
            strategy_id,
            interval_key = %interval_key,
            "🚀 信号 {} @ {}，开始分发给 {} 个订阅者",
            signal.signal,
            signal.price,
            subscribers_count
        );
        let trades_generated = self.fan_out(&subscriptions, &signal, &settings).await;

        let record =
            ExecutionRecord::new(strategy_id, &interval_key, worker_id, ExecutionStatus::Success)
                .with_signal(Some(signal.signal))
                .with_counts(subscribers_count, trades_generated)
                .with_duration(elapsed_ms(started));
        let result = self.finish(record).await?;

        self.ctx
            .publisher
            .publish(RelayEvent::ExecutionCompleted {
                strategy_id: strategy_id.to_string(),
                interval_key: interval_key.clone(),
                signal_type: Some(signal.signal),
                subscribers_count,
                trades_generated,
                duration_ms: result.duration_ms,
            })
            .await;

        info!(
            strategy_id,
            interval_key = %interval_key,
            "✅ 策略执行完成: 订阅者 {}，开仓 {}，耗时 {}ms",
            subscribers_count,
            trades_generated,
            result.duration_ms
        );
        Ok(result)
    }

    /// 处理单个订阅者，返回是否开仓
    ///
    /// 所有错误都在这里转换为跳过，不会影响其他订阅者
    pub async fn process_signal_for_subscriber(
        &self,
        subscription: &Subscription,
        signal: &Signal,
        settings: &StrategySettings,
    ) -> bool {
        match self
            .open_position_for_subscriber(subscription, signal, settings)
            .await
        {
            Ok(SubscriberDecision::Opened { position_id }) => {
                info!(
                    subscription_id = %subscription.id,
                    position_id = %position_id,
                    "📝 订阅者开仓成功"
                );
                true
            }
            Ok(SubscriberDecision::Skipped(reason)) => {
                if reason.is_warning() {
                    warn!(subscription_id = %subscription.id, "跳过订阅者: {}", reason);
                } else {
                    debug!(subscription_id = %subscription.id, "跳过订阅者: {}", reason);
                }
                false
            }
            Err(e) => {
                warn!(subscription_id = %subscription.id, "处理订阅者信号失败: {:#}", e);
                false
            }
        }
    }

    async fn open_position_for_subscriber(
        &self,
        subscription: &Subscription,
        signal: &Signal,
        settings: &StrategySettings,
    ) -> anyhow::Result<SubscriberDecision> {
        use SubscriberDecision::Skipped;

        if !subscription.is_tradable() {
            return Ok(Skipped(SkipReason::NotTradable));
        }
        let Some(limits) = subscription.active_settings() else {
            return Ok(Skipped(SkipReason::MissingSettings));
        };
        let Some(side) = PositionSide::from_signal(signal.signal) else {
            return Ok(Skipped(SkipReason::NoEntrySignal(signal.signal)));
        };

        let open_positions = self
            .ctx
            .positions
            .count_open_by_subscription(&subscription.id)
            .await?;
        let realized_today = self
            .ctx
            .positions
            .realized_pnl_since(&subscription.id, utc_midnight(Utc::now()))
            .await?;
        let decision = check_subscriber_limits(limits, open_positions, realized_today);
        if !decision.is_allowed() {
            return Ok(Skipped(SkipReason::LimitReached(decision)));
        }

        let risk_per_trade = positive_or(limits.risk_per_trade, settings.default_risk_per_trade);
        let leverage = positive_or(limits.leverage, settings.default_leverage);
        let quantity = calculate_position_size(
            limits.capital,
            risk_per_trade,
            signal.price,
            signal.stop_loss,
            leverage,
        );
        if quantity <= 0.0 {
            return Ok(Skipped(SkipReason::ZeroSize));
        }

        let Some(credentials) = self.load_credentials(subscription).await? else {
            return Ok(Skipped(SkipReason::MissingCredentials));
        };

        // clOrdId 只允许字母数字
        let position_id = Uuid::new_v4();
        let request = OrderRequest {
            symbol: settings.symbol.clone(),
            side: side.entry_side(),
            quantity,
            price: signal.price,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            leverage,
            client_tag: Some(position_id.simple().to_string()),
        };
        let placement = match self.ctx.broker.place_order(&credentials, &request).await {
            Ok(p) => p,
            Err(e) => return Ok(Skipped(SkipReason::BrokerRejected(format!("{:#}", e)))),
        };

        let metadata = PositionMetadata {
            entry_order_id: Some(placement.order_id.clone()),
            stop_loss_order_id: placement.stop_loss_order_id.clone(),
            take_profit_order_id: placement.take_profit_order_id.clone(),
            order_ids: placement.all_order_ids(),
            entry_signal: Some(signal.clone()),
            strategy_id: settings.id.clone(),
            hold_period_hours: settings.hold_period_hours,
            ..Default::default()
        };
        let entry_price = placement
            .fill_price
            .filter(|p| *p > 0.0)
            .unwrap_or(signal.price);

        let tracked = match Position::open(
            position_id.to_string(),
            subscription.id.clone(),
            settings.id.clone(),
            settings.symbol.clone(),
            side,
            quantity,
            entry_price,
            signal.stop_loss,
            signal.take_profit,
            metadata,
        ) {
            Ok(position) => self.ctx.positions.insert(&position).await.map(|_| position),
            Err(e) => Err(e.into()),
        };
        let position = match tracked {
            Ok(position) => position,
            Err(e) => {
                self.unwind_untracked_entry(
                    &credentials,
                    subscription,
                    settings,
                    side,
                    quantity,
                    &placement,
                    &e,
                )
                .await;
                return Err(e.context(format!(
                    "订单 {} 已提交但持仓写入失败",
                    placement.order_id
                )));
            }
        };

        if let Err(e) = self
            .ctx
            .subscriptions
            .record_trade_opened(&subscription.id)
            .await
        {
            warn!(subscription_id = %subscription.id, "更新订阅交易次数失败: {:#}", e);
        }

        self.ctx
            .publisher
            .publish(RelayEvent::PositionOpened {
                position_id: position.id.clone(),
                subscription_id: subscription.id.clone(),
                strategy_id: settings.id.clone(),
                symbol: position.symbol.clone(),
                side,
                quantity,
                entry_price,
            })
            .await;

        Ok(SubscriberDecision::Opened {
            position_id: position.id,
        })
    }

    /// 订单已成交但没有持仓记录：尽力撤销止损止盈并市价反向平掉，再发布失败事件
    #[allow(clippy::too_many_arguments)]
    async fn unwind_untracked_entry(
        &self,
        credentials: &BrokerCredentials,
        subscription: &Subscription,
        settings: &StrategySettings,
        side: PositionSide,
        quantity: f64,
        placement: &OrderPlacement,
        cause: &anyhow::Error,
    ) {
        error!(
            subscription_id = %subscription.id,
            order_id = %placement.order_id,
            "⚠️ 订单已提交但持仓未记录，尝试市价平仓: {:#}",
            cause
        );

        let protective = [&placement.stop_loss_order_id, &placement.take_profit_order_id];
        for order_id in protective.into_iter().flatten() {
            if let Err(e) = self
                .ctx
                .broker
                .cancel_order(credentials, &settings.symbol, order_id)
                .await
            {
                warn!(order_id = %order_id, "撤销保护单失败: {:#}", e);
            }
        }

        let unwind = match self
            .ctx
            .broker
            .place_market_order(credentials, &settings.symbol, side.close_side(), quantity)
            .await
        {
            Ok(close) => format!("已市价平仓 {}", close.order_id),
            Err(e) => {
                error!(
                    subscription_id = %subscription.id,
                    order_id = %placement.order_id,
                    "市价平仓失败，需人工处理: {:#}",
                    e
                );
                format!("市价平仓失败，需人工处理: {:#}", e)
            }
        };

        self.ctx
            .publisher
            .publish(RelayEvent::ExecutionFailed {
                strategy_id: settings.id.clone(),
                interval_key: None,
                error: format!(
                    "订阅者 {} 的订单 {} 未记录为持仓 ({:#})，{}",
                    subscription.id, placement.order_id, cause, unwind
                ),
            })
            .await;
    }

    async fn fan_out(
        &self,
        subscriptions: &[Subscription],
        signal: &Signal,
        settings: &StrategySettings,
    ) -> u32 {
        let tasks = subscriptions.iter().map(|subscription| async move {
            let outcome = AssertUnwindSafe(
                self.process_signal_for_subscriber(subscription, signal, settings),
            )
            .catch_unwind()
            .await;
            match outcome {
                Ok(created) => created,
                Err(panic) => {
                    error!(
                        subscription_id = %subscription.id,
                        "订阅者处理异常终止: {}",
                        panic_message(panic.as_ref())
                    );
                    false
                }
            }
        });

        join_all(tasks).await.into_iter().filter(|created| *created).count() as u32
    }

    async fn evaluate_signal(
        &self,
        settings: &StrategySettings,
        scheduled_time: DateTime<Utc>,
    ) -> Result<Option<Signal>, ExecutionError> {
        let request = SignalRequest {
            strategy_id: settings.id.clone(),
            execution_time: scheduled_time,
            settings: settings.clone(),
        };

        let response = match tokio::time::timeout(
            self.config.signal_timeout,
            self.ctx.signal_source.evaluate(&request),
        )
        .await
        {
            Err(_) => return Err(ExecutionError::SignalTimeout(self.config.signal_timeout)),
            Ok(Err(e)) => return Err(ExecutionError::SignalFailed(format!("{:#}", e))),
            Ok(Ok(response)) => response,
        };

        for line in &response.logs {
            debug!(strategy_id = %settings.id, "[signal] {}", line);
        }

        if !response.success {
            return Err(ExecutionError::SignalFailed(
                response
                    .error
                    .unwrap_or_else(|| "信号源返回失败但未给出原因".to_string()),
            ));
        }
        Ok(response.signal)
    }

    async fn load_credentials(
        &self,
        subscription: &Subscription,
    ) -> anyhow::Result<Option<BrokerCredentials>> {
        let Some(credentials_id) = subscription.broker_credentials_id.as_deref() else {
            return Ok(None);
        };
        let credentials = self.ctx.credentials.find_by_id(credentials_id).await?;
        Ok(credentials.filter(|c| match c.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!(subscription_id = %subscription.id, "券商凭证无效: {}", e);
                false
            }
        }))
    }

    /// 写入执行记录并更新策略执行状态
    async fn finish(&self, record: ExecutionRecord) -> Result<ExecutionResult, ExecutionError> {
        self.ctx
            .records
            .append(&record)
            .await
            .map_err(ExecutionError::store)?;

        let status = StrategyExecutionStatus {
            last_executed_at: record.executed_at,
            last_interval_key: record.interval_key.clone(),
            last_status: record.status,
            last_signal_type: record.signal_type,
            last_trades_generated: record.trades_generated,
            last_worker_id: record.worker_id.clone(),
        };
        if let Err(e) = self
            .ctx
            .strategies
            .update_execution_status(&record.strategy_id, &status)
            .await
        {
            warn!(strategy_id = %record.strategy_id, "更新策略执行状态失败: {:#}", e);
        }

        Ok(ExecutionResult::from_record(&record))
    }

    async fn abort(
        &self,
        strategy_id: &str,
        locked_key: Option<String>,
        worker_id: &str,
        started: Instant,
        err: ExecutionError,
    ) -> ExecutionResult {
        error!(strategy_id, worker_id, "❌ 策略执行中止: {}", err);

        if let Some(interval_key) = locked_key.as_deref() {
            let record =
                ExecutionRecord::new(strategy_id, interval_key, worker_id, ExecutionStatus::Failed)
                    .with_duration(elapsed_ms(started))
                    .with_error(err.to_string());
            if let Err(e) = self.ctx.records.append(&record).await {
                warn!(strategy_id, "写入失败执行记录失败: {:#}", e);
            }
        }

        self.ctx
            .publisher
            .publish(RelayEvent::ExecutionFailed {
                strategy_id: strategy_id.to_string(),
                interval_key: locked_key.clone(),
                error: err.to_string(),
            })
            .await;

        ExecutionResult::aborted(strategy_id, locked_key, started, err.to_string())
    }

    /// 执行锁 TTL 不短于信号超时加分发余量，锁过期前本周期必然结束
    fn lock_ttl(&self, timeframe: Timeframe) -> Duration {
        Duration::from_secs(timeframe.lock_ttl_secs())
            .max(self.config.signal_timeout + FAN_OUT_MARGIN)
    }

    fn check_schedule_skew(&self, strategy_id: &str, scheduled_time: DateTime<Utc>) {
        let skew_secs = (Utc::now() - scheduled_time).num_seconds().unsigned_abs();
        if skew_secs > self.config.max_schedule_skew.as_secs() {
            warn!(
                strategy_id,
                scheduled_time = %scheduled_time,
                "调度时间偏差 {}s 超过 {}s，继续执行",
                skew_secs,
                self.config.max_schedule_skew.as_secs()
            );
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value > 0.0 {
        value
    } else {
        fallback
    }
}

/// 当日 UTC 零点
fn utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|d| d.and_utc())
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use quant_relay_domain::traits::ExecutionRecordRepository;
    use quant_relay_domain::{
        OrderSide, PositionStatus, SignalResponse, SubscriberSettings, Timeframe,
    };
    use std::sync::Arc;

    fn coordinator(fixture: &Fixture) -> ExecutionCoordinator {
        ExecutionCoordinator::new(
            fixture.context(),
            CoordinatorConfig {
                worker_id: "w1".to_string(),
                signal_timeout: Duration::from_millis(200),
                ..Default::default()
            },
        )
    }

    fn settings() -> StrategySettings {
        StrategySettings::new("st1", "BTC-USDT-SWAP", Timeframe::M5)
    }

    fn long_signal() -> Signal {
        Signal::new(SignalType::Long, 100.0).with_stop_loss(95.0)
    }

    #[tokio::test]
    async fn test_paused_subscriber_is_skipped() {
        let fixture = Fixture::new();
        let mut sub = fixture.add_subscriber("sub1", 10_000.0);
        sub.is_paused = true;
        fixture.store.put_subscription(sub.clone());

        let created = coordinator(&fixture)
            .process_signal_for_subscriber(&sub, &long_signal(), &settings())
            .await;
        assert!(!created);
        assert!(fixture.broker.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn test_hold_and_exit_signals_never_open() {
        let fixture = Fixture::new();
        let sub = fixture.add_subscriber("sub1", 10_000.0);
        let coordinator = coordinator(&fixture);

        for signal_type in [SignalType::Hold, SignalType::ExitLong, SignalType::ExitShort] {
            let signal = Signal::new(signal_type, 100.0);
            assert!(
                !coordinator
                    .process_signal_for_subscriber(&sub, &signal, &settings())
                    .await
            );
        }
        assert!(fixture.broker.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn test_degenerate_stop_is_skipped() {
        let fixture = Fixture::new();
        let sub = fixture.add_subscriber("sub1", 10_000.0);

        let signal = Signal::new(SignalType::Long, 100.0).with_stop_loss(100.0);
        let created = coordinator(&fixture)
            .process_signal_for_subscriber(&sub, &signal, &settings())
            .await;
        assert!(!created);
        assert!(fixture.broker.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn test_missing_credentials_is_skipped() {
        let fixture = Fixture::new();
        let mut sub = fixture.add_subscriber("sub1", 10_000.0);
        sub.broker_credentials_id = None;
        fixture.store.put_subscription(sub.clone());

        assert!(
            !coordinator(&fixture)
                .process_signal_for_subscriber(&sub, &long_signal(), &settings())
                .await
        );
    }

    #[tokio::test]
    async fn test_opens_position_with_metadata() {
        let fixture = Fixture::new();
        let sub = fixture.add_subscriber("sub1", 10_000.0);

        let created = coordinator(&fixture)
            .process_signal_for_subscriber(&sub, &long_signal(), &settings())
            .await;
        assert!(created);

        let orders = fixture.broker.placed_orders();
        assert_eq!(orders.len(), 1);
        assert!((orders[0].quantity - 40.0).abs() < 1e-9);

        let positions = fixture.store.positions_by_subscription("sub1");
        assert_eq!(positions.len(), 1);
        let position = &positions[0];
        assert_eq!(position.status, PositionStatus::Open);
        assert_eq!(position.side, PositionSide::Long);
        assert_eq!(position.entry_signal_type(), Some(SignalType::Long));
        assert!(position.metadata.stop_loss_order_id.is_some());
        assert_eq!(position.metadata.order_ids.len(), 2);

        assert_eq!(fixture.store.subscription("sub1").unwrap().total_trades, 1);
        assert_eq!(fixture.publisher.names(), vec!["POSITION_OPENED"]);
    }

    #[test]
    fn test_lock_ttl_covers_signal_timeout() {
        let fixture = Fixture::new();
        let with_timeout = |secs| {
            ExecutionCoordinator::new(
                fixture.context(),
                CoordinatorConfig {
                    signal_timeout: Duration::from_secs(secs),
                    ..Default::default()
                },
            )
        };

        assert_eq!(with_timeout(30).lock_ttl(Timeframe::M1), Duration::from_secs(120));
        assert_eq!(with_timeout(300).lock_ttl(Timeframe::M1), Duration::from_secs(390));
        assert_eq!(with_timeout(300).lock_ttl(Timeframe::H1), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_untracked_entry_is_flattened() {
        let fixture = Fixture::new();
        let sub = fixture.add_subscriber("sub1", 10_000.0);
        let mut ctx = fixture.context();
        ctx.positions = Arc::new(FailingPositionInserts(fixture.store.clone()));
        let coordinator = ExecutionCoordinator::new(ctx, CoordinatorConfig::default());

        let created = coordinator
            .process_signal_for_subscriber(&sub, &long_signal(), &settings())
            .await;
        assert!(!created);

        assert_eq!(fixture.broker.placed_orders().len(), 1);
        let market = fixture.broker.market_orders();
        assert_eq!(market.len(), 1);
        assert_eq!(market[0].1, OrderSide::Sell);
        assert!((market[0].2 - 40.0).abs() < 1e-9);
        assert_eq!(fixture.broker.cancelled().len(), 1);

        assert!(fixture.store.positions_by_subscription("sub1").is_empty());
        assert_eq!(fixture.store.subscription("sub1").unwrap().total_trades, 0);
        assert_eq!(fixture.publisher.names(), vec!["EXECUTION_FAILED"]);
        match &fixture.publisher.events()[0] {
            RelayEvent::ExecutionFailed { error, .. } => assert!(error.contains("已市价平仓")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_max_positions_limit() {
        let fixture = Fixture::new();
        let mut sub = fixture.add_subscriber("sub1", 10_000.0);
        sub.settings = Some(SubscriberSettings {
            max_positions: 1,
            ..sub.settings.clone().unwrap()
        });
        fixture.store.put_subscription(sub.clone());
        let coordinator = coordinator(&fixture);

        assert!(
            coordinator
                .process_signal_for_subscriber(&sub, &long_signal(), &settings())
                .await
        );
        assert!(
            !coordinator
                .process_signal_for_subscriber(&sub, &long_signal(), &settings())
                .await
        );
        assert_eq!(fixture.broker.placed_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_no_subscribers_skips_signal_source() {
        let fixture = Fixture::new();
        fixture.store.put_strategy(settings());

        let result = coordinator(&fixture)
            .execute_strategy("st1", Utc::now())
            .await;
        assert!(result.success);
        assert_eq!(result.status(), Some(ExecutionStatus::Skipped));
        assert_eq!(fixture.signal.calls(), 0);

        let records = fixture.store.execution_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ExecutionStatus::Skipped);
    }

    #[tokio::test]
    async fn test_signal_timeout_records_failure() {
        let fixture = Fixture::with_signal(MockSignalSource::hanging());
        fixture.store.put_strategy(settings());
        fixture.add_subscriber("sub1", 10_000.0);

        let result = coordinator(&fixture)
            .execute_strategy("st1", Utc::now())
            .await;
        assert!(!result.success);
        assert_eq!(result.status(), Some(ExecutionStatus::Failed));
        assert!(fixture.broker.placed_orders().is_empty());
        assert!(fixture.publisher.names().contains(&"EXECUTION_FAILED"));

        let status = fixture.store.execution_status("st1").unwrap();
        assert_eq!(status.last_status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_absent_signal_records_no_signal() {
        let fixture = Fixture::with_signal(MockSignalSource::responding(SignalResponse::ok(None)));
        fixture.store.put_strategy(settings());
        fixture.add_subscriber("sub1", 10_000.0);

        let result = coordinator(&fixture)
            .execute_strategy("st1", Utc::now())
            .await;
        assert!(result.success);
        assert_eq!(result.status(), Some(ExecutionStatus::NoSignal));
        assert_eq!(fixture.signal.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_strategy_never_errors() {
        let fixture = Fixture::new();
        let result = coordinator(&fixture)
            .execute_strategy("missing", Utc::now())
            .await;
        assert!(!result.success);
        assert_eq!(result.outcome, ExecutionOutcome::Aborted);
        assert!(result.error.unwrap().contains("missing"));
        // 未获取执行锁，不写入执行记录
        assert!(fixture.store.execution_records().is_empty());
        assert_eq!(fixture.publisher.names(), vec!["EXECUTION_FAILED"]);
    }

    #[tokio::test]
    async fn test_second_call_in_same_interval_is_lock_contention() {
        let fixture = Fixture::with_signal(MockSignalSource::responding(SignalResponse::ok(Some(
            long_signal(),
        ))));
        fixture.store.put_strategy(settings());
        fixture.add_subscriber("sub1", 10_000.0);
        let coordinator = coordinator(&fixture);
        let tick = Timeframe::M5.floor(Utc::now());

        let first = coordinator.execute_strategy("st1", tick).await;
        assert_eq!(first.status(), Some(ExecutionStatus::Success));
        assert_eq!(first.trades_generated, 1);

        let second = coordinator
            .execute_strategy_as("st1", tick + chrono::Duration::seconds(10), "w2")
            .await;
        assert!(second.is_lock_contention());
        assert!(!second.success);
        assert_eq!(fixture.signal.calls(), 1);
        assert_eq!(fixture.store.execution_records().len(), 1);

        let latest = fixture
            .store
            .latest_success_after("st1", tick - chrono::Duration::minutes(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.signal_type, Some(SignalType::Long));
    }

    #[test]
    fn test_utc_midnight() {
        let now = DateTime::parse_from_rfc3339("2024-03-05T17:45:12Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(utc_midnight(now).to_rfc3339(), "2024-03-05T00:00:00+00:00");
    }
}
