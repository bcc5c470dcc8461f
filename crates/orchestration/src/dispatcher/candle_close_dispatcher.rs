//! K线收盘分发
//!
//! 一根K线收盘时，找出注册在 (交易对, 周期) 上的全部策略并并发执行。
//! 多个 worker 同时收到同一个收盘事件是正常的，执行锁保证每个周期只执行一次。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{error, info, warn};

use quant_relay_domain::traits::StrategySettingsRepository;
use quant_relay_domain::Timeframe;
use quant_relay_services::{ExecutionCoordinator, ExecutionResult};

pub struct CandleCloseDispatcher {
    coordinator: Arc<ExecutionCoordinator>,
    strategies: Arc<dyn StrategySettingsRepository>,
}

impl CandleCloseDispatcher {
    pub fn new(
        coordinator: Arc<ExecutionCoordinator>,
        strategies: Arc<dyn StrategySettingsRepository>,
    ) -> Self {
        Self {
            coordinator,
            strategies,
        }
    }

    /// 执行某根收盘K线上注册的全部策略
    ///
    /// 策略查询失败时记录错误并返回空结果，由下一根K线重新触发
    pub async fn execute_candle_strategies(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        close_time: DateTime<Utc>,
    ) -> Vec<ExecutionResult> {
        let strategies = match self
            .strategies
            .find_by_symbol_and_timeframe(symbol, timeframe)
            .await
        {
            Ok(strategies) => strategies,
            Err(e) => {
                error!(
                    symbol = %symbol,
                    timeframe = %timeframe,
                    "❌ 查询K线注册策略失败: {}", e
                );
                return Vec::new();
            }
        };

        if strategies.is_empty() {
            return Vec::new();
        }

        info!(
            symbol = %symbol,
            timeframe = %timeframe,
            close_time = %close_time,
            "🚀 K线收盘，执行 {} 个策略",
            strategies.len()
        );

        let results = join_all(strategies.iter().map(|settings| {
            self.coordinator
                .execute_strategy(&settings.id, close_time)
        }))
        .await;

        let failed = results
            .iter()
            .filter(|r| !r.success && !r.is_lock_contention())
            .count();
        if failed > 0 {
            warn!(
                symbol = %symbol,
                timeframe = %timeframe,
                "{}/{} 个策略执行失败",
                failed,
                results.len()
            );
        }
        results
    }

    /// 调度 tick：计算刚收盘的周期边界，按交易对并发分发
    pub async fn dispatch_close(
        &self,
        symbols: &[String],
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Vec<ExecutionResult> {
        let close_time = timeframe.floor(now);
        join_all(
            symbols
                .iter()
                .map(|symbol| self.execute_candle_strategies(symbol, timeframe, close_time)),
        )
        .await
        .into_iter()
        .flatten()
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::TimeZone;

    use quant_relay_domain::traits::SignalSource;
    use quant_relay_domain::{
        BrokerCredentials, ExecutionStatus, SignalRequest, SignalResponse, StrategySettings,
        SubscriberSettings, Subscription,
    };
    use quant_relay_infrastructure::{
        InMemoryExecutionLock, InMemoryStore, PaperBrokerGateway, TracingEventPublisher,
    };
    use quant_relay_services::{CoordinatorConfig, RelayContext};

    struct NoSignal;

    #[async_trait]
    impl SignalSource for NoSignal {
        async fn evaluate(&self, _request: &SignalRequest) -> Result<SignalResponse> {
            Ok(SignalResponse::ok(None))
        }
    }

    fn context(store: &InMemoryStore, lock: &InMemoryExecutionLock) -> RelayContext {
        RelayContext {
            strategies: Arc::new(store.clone()),
            subscriptions: Arc::new(store.clone()),
            credentials: Arc::new(store.clone()),
            positions: Arc::new(store.clone()),
            records: Arc::new(store.clone()),
            lock: Arc::new(lock.clone()),
            signal_source: Arc::new(NoSignal),
            broker: Arc::new(PaperBrokerGateway::new()),
            publisher: Arc::new(TracingEventPublisher),
        }
    }

    fn dispatcher(
        store: &InMemoryStore,
        lock: &InMemoryExecutionLock,
        worker_id: &str,
    ) -> CandleCloseDispatcher {
        let coordinator = ExecutionCoordinator::new(
            context(store, lock),
            CoordinatorConfig {
                worker_id: worker_id.to_string(),
                ..Default::default()
            },
        );
        CandleCloseDispatcher::new(Arc::new(coordinator), Arc::new(store.clone()))
    }

    fn subscribe(store: &InMemoryStore, id: &str, strategy_id: &str) {
        store.put_credentials(BrokerCredentials {
            id: format!("{}-creds", id),
            exchange_name: "paper".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            passphrase: None,
            is_sandbox: true,
        });
        store.put_subscription(Subscription::new(
            id,
            "user-1",
            strategy_id,
            SubscriberSettings {
                capital: 1_000.0,
                ..Default::default()
            },
            Some(format!("{}-creds", id)),
        ));
    }

    #[tokio::test]
    async fn test_executes_only_strategies_registered_on_the_candle() {
        let store = InMemoryStore::new();
        let lock = InMemoryExecutionLock::new();
        store.put_strategy(StrategySettings::new("btc-a", "BTC-USDT-SWAP", Timeframe::H1));
        store.put_strategy(StrategySettings::new("btc-b", "BTC-USDT-SWAP", Timeframe::H1));
        store.put_strategy(StrategySettings::new("btc-5m", "BTC-USDT-SWAP", Timeframe::M5));
        store.put_strategy(StrategySettings::new("eth-a", "ETH-USDT-SWAP", Timeframe::H1));

        let close_time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let results = dispatcher(&store, &lock, "w1")
            .execute_candle_strategies("BTC-USDT-SWAP", Timeframe::H1, close_time)
            .await;

        let mut ids: Vec<_> = results.iter().map(|r| r.strategy_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["btc-a", "btc-b"]);
        // 没有订阅者：记为 SKIPPED
        assert!(results
            .iter()
            .all(|r| r.status() == Some(ExecutionStatus::Skipped)));
    }

    #[tokio::test]
    async fn test_unregistered_candle_is_a_noop() {
        let store = InMemoryStore::new();
        let lock = InMemoryExecutionLock::new();
        let results = dispatcher(&store, &lock, "w1")
            .execute_candle_strategies("DOGE-USDT-SWAP", Timeframe::M15, Utc::now())
            .await;
        assert!(results.is_empty());
        assert!(store.execution_records().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_close_uses_the_closed_boundary() {
        let store = InMemoryStore::new();
        let lock = InMemoryExecutionLock::new();
        store.put_strategy(StrategySettings::new("btc-a", "BTC-USDT-SWAP", Timeframe::H1));
        store.put_strategy(StrategySettings::new("eth-a", "ETH-USDT-SWAP", Timeframe::H1));
        subscribe(&store, "sub1", "btc-a");

        // cron 在整点后 5 秒触发
        let tick = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 5).unwrap();
        let boundary = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let symbols = vec!["BTC-USDT-SWAP".to_string(), "ETH-USDT-SWAP".to_string()];
        let results = dispatcher(&store, &lock, "w1")
            .dispatch_close(&symbols, Timeframe::H1, tick)
            .await;

        assert_eq!(results.len(), 2);
        let expected_key = format!("1H:{}", boundary.timestamp_millis());
        assert!(results
            .iter()
            .all(|r| r.interval_key.as_deref() == Some(expected_key.as_str())));
        let btc = results.iter().find(|r| r.strategy_id == "btc-a").unwrap();
        assert_eq!(btc.status(), Some(ExecutionStatus::NoSignal));
    }

    #[tokio::test]
    async fn test_two_workers_share_one_execution_per_strategy() {
        let store = InMemoryStore::new();
        let lock = InMemoryExecutionLock::new();
        store.put_strategy(StrategySettings::new("btc-a", "BTC-USDT-SWAP", Timeframe::H1));
        store.put_strategy(StrategySettings::new("btc-b", "BTC-USDT-SWAP", Timeframe::H1));
        let close_time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let first = dispatcher(&store, &lock, "w1");
        let second = dispatcher(&store, &lock, "w2");
        let (a, b) = tokio::join!(
            first.execute_candle_strategies("BTC-USDT-SWAP", Timeframe::H1, close_time),
            second.execute_candle_strategies("BTC-USDT-SWAP", Timeframe::H1, close_time),
        );

        let contended = a
            .iter()
            .chain(b.iter())
            .filter(|r| r.is_lock_contention())
            .count();
        assert_eq!(contended, 2);
        assert_eq!(store.execution_records().len(), 2);
    }
}
