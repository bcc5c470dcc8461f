//! 单元测试用的 Mock 协作者

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use chrono::{DateTime, Utc};

use quant_relay_domain::traits::{
    BrokerGateway, EventPublisher, OrderPlacement, OrderRequest, OrderStatusReport,
    PositionRepository, SignalSource,
};
use quant_relay_domain::{
    BrokerCredentials, OrderSide, OrderStatus, Position, PositionClose, RelayEvent, SignalRequest,
    SignalResponse, SubscriberSettings, Subscription,
};
use quant_relay_infrastructure::{InMemoryExecutionLock, InMemoryStore};

use crate::context::RelayContext;

enum SignalBehavior {
    Respond(SignalResponse),
    Hang,
}

/// Mock 信号源
pub struct MockSignalSource {
    behavior: SignalBehavior,
    calls: AtomicUsize,
}

impl MockSignalSource {
    pub fn responding(response: SignalResponse) -> Self {
        Self {
            behavior: SignalBehavior::Respond(response),
            calls: AtomicUsize::new(0),
        }
    }

    /// 永不返回，用于超时测试
    pub fn hanging() -> Self {
        Self {
            behavior: SignalBehavior::Hang,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalSource for MockSignalSource {
    async fn evaluate(&self, _request: &SignalRequest) -> Result<SignalResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            SignalBehavior::Respond(response) => Ok(response.clone()),
            SignalBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(anyhow!("unreachable"))
            }
        }
    }
}

/// Mock 券商网关 - 支持注入失败
#[derive(Default)]
pub struct MockBrokerGateway {
    seq: AtomicU64,
    /// place_order 会失败的凭证ID
    failing_credentials: Mutex<HashSet<String>>,
    /// get_order_status 是否全部失败
    status_unavailable: AtomicBool,
    /// place_market_order 是否失败
    market_orders_rejected: AtomicBool,
    /// 市价单成交价，None 表示券商未返回成交价
    market_fill_price: Mutex<Option<f64>>,
    orders: Mutex<HashMap<String, OrderStatusReport>>,
    placed: Mutex<Vec<OrderRequest>>,
    market_orders: Mutex<Vec<(String, OrderSide, f64)>>,
    cancelled: Mutex<Vec<String>>,
}

impl MockBrokerGateway {
    pub fn fail_for(&self, credentials_id: &str) {
        self.failing_credentials
            .lock()
            .unwrap()
            .insert(credentials_id.to_string());
    }

    pub fn set_status_unavailable(&self, unavailable: bool) {
        self.status_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn reject_market_orders(&self, rejected: bool) {
        self.market_orders_rejected.store(rejected, Ordering::SeqCst);
    }

    pub fn set_market_fill_price(&self, price: Option<f64>) {
        *self.market_fill_price.lock().unwrap() = price;
    }

    pub fn fill(&self, order_id: &str, price: f64) {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(order_id).expect("order exists");
        order.status = OrderStatus::Filled;
        order.average_price = Some(price);
    }

    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.placed.lock().unwrap().clone()
    }

    pub fn market_orders(&self) -> Vec<(String, OrderSide, f64)> {
        self.market_orders.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    fn record(&self, status: OrderStatus, quantity: f64, price: Option<f64>) -> String {
        let id = format!("ord-{}", self.seq.fetch_add(1, Ordering::SeqCst) + 1);
        self.orders.lock().unwrap().insert(
            id.clone(),
            OrderStatusReport {
                order_id: id.clone(),
                status,
                filled_quantity: if status == OrderStatus::Filled { quantity } else { 0.0 },
                average_price: price,
            },
        );
        id
    }
}

#[async_trait]
impl BrokerGateway for MockBrokerGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_order_status(
        &self,
        _credentials: &BrokerCredentials,
        _symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatusReport> {
        if self.status_unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("broker unreachable"));
        }
        self.orders
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown order {}", order_id))
    }

    async fn place_order(
        &self,
        credentials: &BrokerCredentials,
        request: &OrderRequest,
    ) -> Result<OrderPlacement> {
        if self.failing_credentials.lock().unwrap().contains(&credentials.id) {
            return Err(anyhow!("insufficient margin"));
        }
        self.placed.lock().unwrap().push(request.clone());
        let order_id = self.record(OrderStatus::Filled, request.quantity, Some(request.price));
        let stop_loss_order_id = request
            .stop_loss
            .map(|_| self.record(OrderStatus::Open, request.quantity, None));
        let take_profit_order_id = request
            .take_profit
            .map(|_| self.record(OrderStatus::Open, request.quantity, None));
        Ok(OrderPlacement {
            order_id,
            stop_loss_order_id,
            take_profit_order_id,
            fill_price: Some(request.price),
        })
    }

    async fn place_market_order(
        &self,
        _credentials: &BrokerCredentials,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderPlacement> {
        if self.market_orders_rejected.load(Ordering::SeqCst) {
            return Err(anyhow!("order rejected: system busy"));
        }
        self.market_orders
            .lock()
            .unwrap()
            .push((symbol.to_string(), side, quantity));
        let price = *self.market_fill_price.lock().unwrap();
        let order_id = self.record(OrderStatus::Filled, quantity, price);
        Ok(OrderPlacement {
            order_id,
            fill_price: price,
            ..Default::default()
        })
    }

    async fn cancel_order(
        &self,
        _credentials: &BrokerCredentials,
        _symbol: &str,
        order_id: &str,
    ) -> Result<()> {
        self.cancelled.lock().unwrap().push(order_id.to_string());
        if let Some(order) = self.orders.lock().unwrap().get_mut(order_id) {
            if !order.status.is_terminal() {
                order.status = OrderStatus::Cancelled;
            }
        }
        Ok(())
    }
}

/// 记录事件名称的发布器
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<RelayEvent>>,
}

impl RecordingPublisher {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }

    pub fn events(&self) -> Vec<RelayEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: RelayEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// 写入持仓总是失败，其余操作委托给内存存储
pub struct FailingPositionInserts(pub InMemoryStore);

#[async_trait]
impl PositionRepository for FailingPositionInserts {
    async fn insert(&self, _position: &Position) -> Result<()> {
        Err(anyhow!("connection reset"))
    }

    async fn find_by_id(&self, position_id: &str) -> Result<Option<Position>> {
        PositionRepository::find_by_id(&self.0, position_id).await
    }

    async fn find_open(&self) -> Result<Vec<Position>> {
        self.0.find_open().await
    }

    async fn count_open_by_subscription(&self, subscription_id: &str) -> Result<u32> {
        self.0.count_open_by_subscription(subscription_id).await
    }

    async fn realized_pnl_since(
        &self,
        subscription_id: &str,
        since: DateTime<Utc>,
    ) -> Result<f64> {
        self.0.realized_pnl_since(subscription_id, since).await
    }

    async fn close_if_open(&self, position_id: &str, close: &PositionClose) -> Result<bool> {
        self.0.close_if_open(position_id, close).await
    }
}

/// 内存存储 + Mock 协作者
pub struct Fixture {
    pub store: InMemoryStore,
    pub lock: InMemoryExecutionLock,
    pub signal: Arc<MockSignalSource>,
    pub broker: Arc<MockBrokerGateway>,
    pub publisher: Arc<RecordingPublisher>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_signal(MockSignalSource::responding(SignalResponse::ok(None)))
    }

    pub fn with_signal(signal: MockSignalSource) -> Self {
        Self {
            store: InMemoryStore::new(),
            lock: InMemoryExecutionLock::new(),
            signal: Arc::new(signal),
            broker: Arc::new(MockBrokerGateway::default()),
            publisher: Arc::new(RecordingPublisher::default()),
        }
    }

    pub fn context(&self) -> RelayContext {
        RelayContext {
            strategies: Arc::new(self.store.clone()),
            subscriptions: Arc::new(self.store.clone()),
            credentials: Arc::new(self.store.clone()),
            positions: Arc::new(self.store.clone()),
            records: Arc::new(self.store.clone()),
            lock: Arc::new(self.lock.clone()),
            signal_source: self.signal.clone(),
            broker: self.broker.clone(),
            publisher: self.publisher.clone(),
        }
    }

    /// 添加订阅者及其凭证（凭证ID为 `<id>-creds`）
    pub fn add_subscriber(&self, id: &str, capital: f64) -> Subscription {
        let credentials_id = format!("{}-creds", id);
        self.store.put_credentials(BrokerCredentials {
            id: credentials_id.clone(),
            exchange_name: "mock".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            passphrase: Some("pass".to_string()),
            is_sandbox: true,
        });
        let subscription = Subscription::new(
            id,
            format!("user-{}", id),
            "st1",
            SubscriberSettings {
                capital,
                risk_per_trade: 0.02,
                leverage: 1.0,
                ..Default::default()
            },
            Some(credentials_id),
        );
        self.store.put_subscription(subscription.clone());
        subscription
    }
}
