//! 持仓监控
//!
//! 每个监控周期对所有 OPEN 持仓并发检查退出条件，按固定顺序，命中即停：
//! 1. 止损 / 止盈订单成交
//! 2. 持仓时间到期
//! 3. 策略出现反向信号
//!
//! OPEN -> CLOSED 只会发生一次，重复平仓是无操作

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use quant_relay_domain::entities::OrderRole;
use quant_relay_domain::{
    BrokerCredentials, ExitReason, Position, PositionClose, PositionError, RelayEvent,
};

use crate::context::RelayContext;
use crate::error::CloseError;
use crate::panic_message;

/// 平仓租约在执行锁存储中的作用域
const CLOSE_LEASE_SCOPE: &str = "position_close";

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// 平台默认持仓时长（小时）
    pub default_hold_period_hours: f64,
    /// 写入平仓租约的 worker 标识
    pub worker_id: String,
    /// 平仓租约 TTL，需覆盖一次市价平仓的全部券商调用
    pub close_lease_ttl: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            default_hold_period_hours: 24.0,
            worker_id: "worker-local".to_string(),
            close_lease_ttl: Duration::from_secs(120),
        }
    }
}

/// 一轮监控的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub checked: usize,
    pub closed: usize,
    pub failed: usize,
}

pub struct PositionSupervisor {
    ctx: RelayContext,
    config: SupervisorConfig,
}

impl PositionSupervisor {
    pub fn new(ctx: RelayContext, config: SupervisorConfig) -> Self {
        Self { ctx, config }
    }

    /// 并发检查所有 OPEN 持仓，单个持仓的失败不影响其他持仓
    pub async fn monitor_all_open_trades(&self) -> MonitorSummary {
        let positions = match self.ctx.positions.find_open().await {
            Ok(p) => p,
            Err(e) => {
                error!("加载持仓失败，跳过本轮监控: {:#}", e);
                return MonitorSummary::default();
            }
        };

        let tasks = positions.iter().map(|position| async move {
            let outcome = AssertUnwindSafe(self.monitor_trade_orders(&position.id))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(closed)) => Ok(closed.is_some()),
                Ok(Err(e)) => {
                    error!(position_id = %position.id, "持仓监控失败: {}", e);
                    Err(())
                }
                Err(panic) => {
                    error!(
                        position_id = %position.id,
                        "持仓监控异常终止: {}",
                        panic_message(panic.as_ref())
                    );
                    Err(())
                }
            }
        });
        let outcomes = join_all(tasks).await;

        let summary = MonitorSummary {
            checked: outcomes.len(),
            closed: outcomes.iter().filter(|o| matches!(o, Ok(true))).count(),
            failed: outcomes.iter().filter(|o| o.is_err()).count(),
        };
        if summary.checked > 0 {
            info!(
                "持仓监控完成: 检查 {}，平仓 {}，失败 {}",
                summary.checked, summary.closed, summary.failed
            );
        }
        summary
    }

    /// 检查单个持仓的退出条件
    ///
    /// 返回本轮触发的平仓原因；持仓不存在或已平仓时返回 None
    pub async fn monitor_trade_orders(
        &self,
        position_id: &str,
    ) -> Result<Option<ExitReason>, CloseError> {
        let position = match self
            .ctx
            .positions
            .find_by_id(position_id)
            .await
            .map_err(CloseError::store)?
        {
            Some(p) if p.is_open() => p,
            _ => return Ok(None),
        };

        let credentials = match self.ctx.credentials_for_position(&position).await {
            Ok(c) => c,
            Err(e) => {
                warn!(position_id, "加载券商凭证失败: {:#}", e);
                None
            }
        };

        // 1. 止损/止盈成交
        if let Some(creds) = credentials.as_ref() {
            if let Some((reason, average_price)) = self.check_order_fills(&position, creds).await {
                return Ok(self
                    .handle_order_filled(&position, reason, average_price)
                    .await?
                    .then_some(reason));
            }
        } else {
            warn!(position_id, "持仓缺少券商凭证，跳过订单状态检查");
        }

        // 2. 持仓时间到期
        let now = Utc::now();
        let hold_hours = position.hold_period_hours(self.config.default_hold_period_hours);
        let held = position.hours_held(now);
        if held >= hold_hours {
            info!(position_id, "持仓 {:.2}h 已达到 {:.2}h，按时间平仓", held, hold_hours);
            return Ok(self
                .close_trade_manually(&position, ExitReason::TimeExit)
                .await?
                .then_some(ExitReason::TimeExit));
        }

        // 3. 反向信号
        if self.opposite_signal_seen(&position).await {
            info!(position_id, "策略出现反向信号，平仓");
            return Ok(self
                .close_trade_manually(&position, ExitReason::OppositeSignal)
                .await?
                .then_some(ExitReason::OppositeSignal));
        }

        Ok(None)
    }

    /// 查询持仓关联订单，返回已成交的止损或止盈（止损优先）
    async fn check_order_fills(
        &self,
        position: &Position,
        credentials: &BrokerCredentials,
    ) -> Option<(ExitReason, Option<f64>)> {
        let mut stop_loss_fill: Option<Option<f64>> = None;
        let mut take_profit_fill: Option<Option<f64>> = None;

        for order_id in position.tracked_order_ids() {
            let report = match self
                .ctx
                .broker
                .get_order_status(credentials, &position.symbol, &order_id)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(position_id = %position.id, order_id = %order_id, "查询订单状态失败: {:#}", e);
                    continue;
                }
            };
            if !report.is_filled() {
                continue;
            }
            match position.classify_order(&order_id) {
                Some(OrderRole::StopLoss) => stop_loss_fill = Some(report.average_price),
                Some(OrderRole::TakeProfit) => take_profit_fill = Some(report.average_price),
                _ => {}
            }
        }

        if let Some(price) = stop_loss_fill {
            return Some((ExitReason::StopLoss, price));
        }
        take_profit_fill.map(|price| (ExitReason::TakeProfit, price))
    }

    /// 策略在开仓之后最近一次成功执行的信号是否与开仓方向相反
    async fn opposite_signal_seen(&self, position: &Position) -> bool {
        let Some(entry_signal) = position.entry_signal_type() else {
            return false;
        };
        match self
            .ctx
            .records
            .latest_success_after(&position.strategy_id, position.entry_time)
            .await
        {
            Ok(Some(record)) => record
                .signal_type
                .map(|latest| entry_signal.is_reversed_by(latest))
                .unwrap_or(false),
            Ok(None) => false,
            Err(e) => {
                warn!(position_id = %position.id, "查询执行记录失败: {:#}", e);
                false
            }
        }
    }

    /// 止损或止盈成交后平仓
    ///
    /// 返回 false 表示持仓已被其他检查平仓
    pub async fn handle_order_filled(
        &self,
        position: &Position,
        filled: ExitReason,
        average_price: Option<f64>,
    ) -> Result<bool, CloseError> {
        if let Some(sibling) = position.sibling_order_id(filled) {
            self.cancel_best_effort(position, sibling).await;
        }

        let exit_price = average_price
            .filter(|p| *p > 0.0)
            .or(match filled {
                ExitReason::StopLoss => position.stop_loss,
                ExitReason::TakeProfit => position.take_profit,
                _ => None,
            })
            .unwrap_or(position.entry_price);

        self.finalize_close(position, exit_price, filled).await
    }

    /// 市价平仓（时间到期、反向信号、人工）
    ///
    /// 先取得该持仓的平仓租约并重新读取持仓，确认仍为 OPEN 才提交市价单；
    /// 多个 worker 拿着同一份快照并发平仓时只有一个会下单。
    /// 缺少券商凭证时返回错误，不会静默跳过
    pub async fn close_trade_manually(
        &self,
        position: &Position,
        reason: ExitReason,
    ) -> Result<bool, CloseError> {
        if !position.is_open() {
            return Ok(false);
        }

        let credentials = self
            .ctx
            .credentials_for_position(position)
            .await
            .map_err(CloseError::store)?
            .ok_or_else(|| CloseError::MissingCredentials(position.id.clone()))?;

        let leased = self
            .ctx
            .lock
            .try_acquire(
                CLOSE_LEASE_SCOPE,
                &position.id,
                &self.config.worker_id,
                self.config.close_lease_ttl,
            )
            .await
            .map_err(CloseError::store)?;
        if !leased {
            debug!(position_id = %position.id, "持仓正在被其他检查平仓，跳过");
            return Ok(false);
        }

        // 快照可能已过期，以存储中的状态为准
        let current = match self.ctx.positions.find_by_id(&position.id).await {
            Ok(Some(current)) if current.is_open() => current,
            Ok(_) => {
                self.release_close_lease(&position.id).await;
                debug!(position_id = %position.id, "持仓已平仓，忽略重复平仓");
                return Ok(false);
            }
            Err(e) => {
                self.release_close_lease(&position.id).await;
                return Err(CloseError::store(e));
            }
        };

        let placement = match self
            .ctx
            .broker
            .place_market_order(
                &credentials,
                &current.symbol,
                current.close_side(),
                current.quantity,
            )
            .await
        {
            Ok(placement) => placement,
            Err(e) => {
                // 市价单未提交，让出租约以便下一轮重试
                self.release_close_lease(&current.id).await;
                return Err(CloseError::Broker(format!("{:#}", e)));
            }
        };

        for order_id in current.linked_order_ids() {
            self.cancel_with(&credentials, &current, &order_id).await;
        }

        let exit_price = match placement.fill_price.filter(|p| *p > 0.0) {
            Some(price) => price,
            None => self
                .query_fill_price(&credentials, &current, &placement.order_id)
                .await
                .unwrap_or_else(|| {
                    warn!(
                        position_id = %current.id,
                        "无法获取平仓成交价，使用开仓价 {}",
                        current.entry_price
                    );
                    current.entry_price
                }),
        };

        // 市价单已提交：租约保留到 TTL 到期
        let closed = self.finalize_close(&current, exit_price, reason).await?;
        if !closed {
            warn!(
                position_id = %current.id,
                order_id = %placement.order_id,
                "市价平仓单已提交，但持仓已被成交检查平仓"
            );
        }
        Ok(closed)
    }

    async fn release_close_lease(&self, position_id: &str) {
        if let Err(e) = self
            .ctx
            .lock
            .release(CLOSE_LEASE_SCOPE, position_id, &self.config.worker_id)
            .await
        {
            warn!(position_id, "释放平仓租约失败: {:#}", e);
        }
    }

    async fn query_fill_price(
        &self,
        credentials: &BrokerCredentials,
        position: &Position,
        order_id: &str,
    ) -> Option<f64> {
        match self
            .ctx
            .broker
            .get_order_status(credentials, &position.symbol, order_id)
            .await
        {
            Ok(report) => report.average_price.filter(|p| *p > 0.0),
            Err(e) => {
                warn!(position_id = %position.id, "查询平仓单失败: {:#}", e);
                None
            }
        }
    }

    /// 条件写入 CLOSED，并更新订阅盈亏、发布事件
    async fn finalize_close(
        &self,
        position: &Position,
        exit_price: f64,
        reason: ExitReason,
    ) -> Result<bool, CloseError> {
        let close = match position.build_close(exit_price, reason, Utc::now()) {
            Ok(c) => c,
            Err(PositionError::PositionClosed) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let closed = self
            .ctx
            .positions
            .close_if_open(&position.id, &close)
            .await
            .map_err(CloseError::store)?;
        if !closed {
            debug!(position_id = %position.id, "持仓已平仓，忽略重复平仓");
            return Ok(false);
        }

        self.after_close(position, &close).await;
        Ok(true)
    }

    async fn after_close(&self, position: &Position, close: &PositionClose) {
        info!(
            position_id = %position.id,
            subscription_id = %position.subscription_id,
            "✅ 持仓已平仓: {} @ {}，盈亏 {:.4} ({:.2}%)",
            close.exit_reason,
            close.exit_price,
            close.pnl,
            close.pnl_percent
        );

        if let Err(e) = self
            .ctx
            .subscriptions
            .record_trade_closed(&position.subscription_id, close.pnl)
            .await
        {
            warn!(subscription_id = %position.subscription_id, "更新订阅盈亏失败: {:#}", e);
        }

        self.ctx
            .publisher
            .publish(RelayEvent::PositionClosed {
                position_id: position.id.clone(),
                subscription_id: position.subscription_id.clone(),
                symbol: position.symbol.clone(),
                exit_reason: close.exit_reason,
                exit_price: close.exit_price,
                pnl: close.pnl,
                pnl_percent: close.pnl_percent,
            })
            .await;
    }

    async fn cancel_best_effort(&self, position: &Position, order_id: &str) {
        match self.ctx.credentials_for_position(position).await {
            Ok(Some(credentials)) => self.cancel_with(&credentials, position, order_id).await,
            Ok(None) => warn!(position_id = %position.id, "缺少券商凭证，未撤销订单 {}", order_id),
            Err(e) => warn!(position_id = %position.id, "加载券商凭证失败: {:#}", e),
        }
    }

    async fn cancel_with(&self, credentials: &BrokerCredentials, position: &Position, order_id: &str) {
        if let Err(e) = self
            .ctx
            .broker
            .cancel_order(credentials, &position.symbol, order_id)
            .await
        {
            warn!(position_id = %position.id, order_id, "撤销订单失败: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use chrono::Duration;
    use quant_relay_domain::traits::{
        BrokerGateway, ExecutionRecordRepository, OrderRequest, PositionRepository,
    };
    use quant_relay_domain::{
        ExecutionRecord, ExecutionStatus, OrderSide, PositionMetadata, PositionSide,
        PositionStatus, Signal, SignalType,
    };

    fn supervisor(fixture: &Fixture) -> PositionSupervisor {
        PositionSupervisor::new(fixture.context(), SupervisorConfig::default())
    }

    /// 开一个带止损止盈挂单的持仓
    async fn open_position(fixture: &Fixture, side: PositionSide, hours_ago: i64) -> Position {
        let subscription = fixture.add_subscriber("sub1", 10_000.0);
        let creds = fixture
            .context()
            .credentials
            .find_by_id(subscription.broker_credentials_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        let (signal_type, stop_loss, take_profit) = match side {
            PositionSide::Long => (SignalType::Long, 95.0, 110.0),
            PositionSide::Short => (SignalType::Short, 105.0, 90.0),
        };
        let placement = fixture
            .broker
            .place_order(
                &creds,
                &OrderRequest {
                    symbol: "BTC-USDT-SWAP".to_string(),
                    side: side.entry_side(),
                    quantity: 2.0,
                    price: 100.0,
                    stop_loss: Some(stop_loss),
                    take_profit: Some(take_profit),
                    leverage: 1.0,
                    client_tag: None,
                },
            )
            .await
            .unwrap();

        let metadata = PositionMetadata {
            entry_order_id: Some(placement.order_id.clone()),
            stop_loss_order_id: placement.stop_loss_order_id.clone(),
            take_profit_order_id: placement.take_profit_order_id.clone(),
            order_ids: placement.all_order_ids(),
            entry_signal: Some(Signal::new(signal_type, 100.0)),
            strategy_id: "st1".to_string(),
            ..Default::default()
        };
        let mut position = Position::open(
            "p1".to_string(),
            "sub1".to_string(),
            "st1".to_string(),
            "BTC-USDT-SWAP".to_string(),
            side,
            2.0,
            100.0,
            Some(stop_loss),
            Some(take_profit),
            metadata,
        )
        .unwrap();
        position.entry_time = Utc::now() - Duration::hours(hours_ago);
        fixture.store.put_position(position.clone());
        position
    }

    #[tokio::test]
    async fn test_stop_loss_fill_wins_over_time_exit() {
        let fixture = Fixture::new();
        // 已持仓 48h，同时止损单已成交
        let position = open_position(&fixture, PositionSide::Long, 48).await;
        let sl = position.metadata.stop_loss_order_id.clone().unwrap();
        fixture.broker.fill(&sl, 94.5);

        let reason = supervisor(&fixture).monitor_trade_orders("p1").await.unwrap();
        assert_eq!(reason, Some(ExitReason::StopLoss));

        let closed = fixture.store.positions_by_subscription("sub1").remove(0);
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.exit_reason, Some(ExitReason::StopLoss));
        assert_eq!(closed.exit_price, Some(94.5));
        assert_eq!(closed.metadata.closed_by, Some(ExitReason::StopLoss));
        // 只撤销止盈单，不发市价单
        let tp = position.metadata.take_profit_order_id.clone().unwrap();
        assert_eq!(fixture.broker.cancelled(), vec![tp]);
        assert!(fixture.broker.market_orders().is_empty());
        assert!((fixture.store.subscription("sub1").unwrap().total_pnl + 11.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_take_profit_without_price_uses_target() {
        let fixture = Fixture::new();
        let position = open_position(&fixture, PositionSide::Short, 1).await;

        let closed = supervisor(&fixture)
            .handle_order_filled(&position, ExitReason::TakeProfit, None)
            .await
            .unwrap();
        assert!(closed);

        let stored = PositionRepository::find_by_id(&fixture.store, "p1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.exit_price, Some(90.0));
        assert_eq!(stored.pnl, Some(20.0));
        assert_eq!(stored.pnl_percent, Some(10.0));
    }

    #[tokio::test]
    async fn test_second_fill_handling_is_noop() {
        let fixture = Fixture::new();
        let position = open_position(&fixture, PositionSide::Long, 1).await;
        let supervisor = supervisor(&fixture);

        let first = supervisor
            .handle_order_filled(&position, ExitReason::TakeProfit, Some(110.0))
            .await
            .unwrap();
        let second = supervisor
            .handle_order_filled(&position, ExitReason::TakeProfit, Some(110.0))
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(fixture.publisher.names(), vec!["POSITION_CLOSED"]);
        assert!((fixture.store.subscription("sub1").unwrap().total_pnl - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_time_exit_closes_at_market() {
        let fixture = Fixture::new();
        fixture.broker.set_market_fill_price(Some(103.0));
        let position = open_position(&fixture, PositionSide::Long, 30).await;

        let reason = supervisor(&fixture).monitor_trade_orders("p1").await.unwrap();
        assert_eq!(reason, Some(ExitReason::TimeExit));

        let orders = fixture.broker.market_orders();
        assert_eq!(orders, vec![("BTC-USDT-SWAP".to_string(), OrderSide::Sell, 2.0)]);
        // 止损和止盈单都被撤销
        assert_eq!(fixture.broker.cancelled().len(), 2);

        let stored = PositionRepository::find_by_id(&fixture.store, &position.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.exit_reason, Some(ExitReason::TimeExit));
        assert_eq!(stored.pnl, Some(6.0));
    }

    #[tokio::test]
    async fn test_hold_period_override() {
        let fixture = Fixture::new();
        let mut position = open_position(&fixture, PositionSide::Long, 3).await;
        position.metadata.hold_period_hours = Some(2.0);
        fixture.store.put_position(position);

        let reason = supervisor(&fixture).monitor_trade_orders("p1").await.unwrap();
        assert_eq!(reason, Some(ExitReason::TimeExit));
    }

    #[tokio::test]
    async fn test_opposite_signal_after_entry() {
        let fixture = Fixture::new();
        fixture.broker.set_market_fill_price(Some(97.0));
        let position = open_position(&fixture, PositionSide::Long, 1).await;

        // 开仓前的反向信号不算
        let mut before = ExecutionRecord::new("st1", "5m:0", "w1", ExecutionStatus::Success)
            .with_signal(Some(SignalType::Short));
        before.executed_at = position.entry_time - Duration::minutes(5);
        fixture.store.append(&before).await.unwrap();
        assert_eq!(supervisor(&fixture).monitor_trade_orders("p1").await.unwrap(), None);

        let after = ExecutionRecord::new("st1", "5m:1", "w1", ExecutionStatus::Success)
            .with_signal(Some(SignalType::ExitLong));
        fixture.store.append(&after).await.unwrap();

        let reason = supervisor(&fixture).monitor_trade_orders("p1").await.unwrap();
        assert_eq!(reason, Some(ExitReason::OppositeSignal));
        let stored = PositionRepository::find_by_id(&fixture.store, "p1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.pnl, Some(-6.0));
    }

    #[tokio::test]
    async fn test_broker_outage_is_not_fatal() {
        let fixture = Fixture::new();
        let position = open_position(&fixture, PositionSide::Long, 1).await;
        fixture
            .broker
            .fill(position.metadata.stop_loss_order_id.as_deref().unwrap(), 95.0);
        fixture.broker.set_status_unavailable(true);

        let summary = supervisor(&fixture).monitor_all_open_trades().await;
        assert_eq!(
            summary,
            MonitorSummary {
                checked: 1,
                closed: 0,
                failed: 0
            }
        );

        fixture.broker.set_status_unavailable(false);
        let summary = supervisor(&fixture).monitor_all_open_trades().await;
        assert_eq!(summary.closed, 1);
    }

    #[tokio::test]
    async fn test_manual_close_requires_credentials() {
        let fixture = Fixture::new();
        let position = open_position(&fixture, PositionSide::Long, 1).await;
        let mut sub = fixture.store.subscription("sub1").unwrap();
        sub.broker_credentials_id = None;
        fixture.store.put_subscription(sub);

        let err = supervisor(&fixture)
            .close_trade_manually(&position, ExitReason::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, CloseError::MissingCredentials(_)));
        assert!(fixture.broker.market_orders().is_empty());
    }

    #[tokio::test]
    async fn test_manual_close_falls_back_to_entry_price() {
        let fixture = Fixture::new();
        fixture.broker.set_market_fill_price(None);
        let position = open_position(&fixture, PositionSide::Short, 1).await;

        assert!(supervisor(&fixture)
            .close_trade_manually(&position, ExitReason::Manual)
            .await
            .unwrap());
        let stored = PositionRepository::find_by_id(&fixture.store, "p1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.exit_price, Some(100.0));
        assert_eq!(stored.pnl, Some(0.0));
    }

    #[tokio::test]
    async fn test_repeated_close_on_same_snapshot_sends_one_market_order() {
        let fixture = Fixture::new();
        fixture.broker.set_market_fill_price(Some(101.0));
        let snapshot = open_position(&fixture, PositionSide::Long, 30).await;
        let supervisor = supervisor(&fixture);

        let first = supervisor
            .close_trade_manually(&snapshot, ExitReason::TimeExit)
            .await
            .unwrap();
        let second = supervisor
            .close_trade_manually(&snapshot, ExitReason::TimeExit)
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(fixture.broker.market_orders().len(), 1);
        assert_eq!(fixture.publisher.names(), vec!["POSITION_CLOSED"]);
    }

    #[tokio::test]
    async fn test_concurrent_workers_close_once() {
        let fixture = Fixture::new();
        fixture.broker.set_market_fill_price(Some(101.0));
        let snapshot = open_position(&fixture, PositionSide::Long, 30).await;
        let worker = |id: &str| {
            PositionSupervisor::new(
                fixture.context(),
                SupervisorConfig {
                    worker_id: id.to_string(),
                    ..Default::default()
                },
            )
        };
        let (a, b) = (worker("w1"), worker("w2"));

        let (first, second) = tokio::join!(
            a.close_trade_manually(&snapshot, ExitReason::TimeExit),
            b.close_trade_manually(&snapshot, ExitReason::TimeExit),
        );
        let closes = [first.unwrap(), second.unwrap()];
        assert_eq!(closes.iter().filter(|c| **c).count(), 1);
        assert_eq!(fixture.broker.market_orders().len(), 1);
        assert!((fixture.store.subscription("sub1").unwrap().total_pnl - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rejected_market_order_can_be_retried() {
        let fixture = Fixture::new();
        fixture.broker.set_market_fill_price(Some(99.0));
        let snapshot = open_position(&fixture, PositionSide::Long, 30).await;
        let supervisor = supervisor(&fixture);

        fixture.broker.reject_market_orders(true);
        let err = supervisor
            .close_trade_manually(&snapshot, ExitReason::TimeExit)
            .await
            .unwrap_err();
        assert!(matches!(err, CloseError::Broker(_)));
        assert!(fixture.lock.holder(CLOSE_LEASE_SCOPE, "p1").is_none());

        fixture.broker.reject_market_orders(false);
        assert!(supervisor
            .close_trade_manually(&snapshot, ExitReason::TimeExit)
            .await
            .unwrap());
        assert_eq!(fixture.broker.market_orders().len(), 1);
    }
}
