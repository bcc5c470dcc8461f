//! OKX REST v5 券商网关
//!
//! 市价开仓走 `/trade/order`，止损止盈作为条件单走 `/trade/order-algo`

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, info, warn};

use quant_relay_domain::traits::{BrokerGateway, OrderPlacement, OrderRequest, OrderStatusReport};
use quant_relay_domain::{BrokerCredentials, OrderSide, OrderStatus};

type HmacSha256 = Hmac<Sha256>;

/// 统一返回格式
#[derive(Debug, Deserialize)]
struct OkxResponse<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxOrderAck {
    #[serde(default)]
    ord_id: String,
    #[serde(default)]
    s_code: String,
    #[serde(default)]
    s_msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxAlgoAck {
    #[serde(default)]
    algo_id: String,
    #[serde(default)]
    s_code: String,
    #[serde(default)]
    s_msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxOrderDetail {
    ord_id: String,
    state: String,
    #[serde(default)]
    acc_fill_sz: String,
    #[serde(default)]
    avg_px: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxAlgoDetail {
    algo_id: String,
    state: String,
    #[serde(default)]
    actual_sz: String,
    #[serde(default)]
    actual_px: String,
}

/// 普通订单状态映射
fn map_order_state(state: &str) -> OrderStatus {
    match state {
        "live" => OrderStatus::Open,
        "partially_filled" => OrderStatus::PartiallyFilled,
        "filled" => OrderStatus::Filled,
        "canceled" | "mmp_canceled" => OrderStatus::Cancelled,
        _ => OrderStatus::Unknown,
    }
}

/// 条件单状态映射：effective 表示已触发并下单
fn map_algo_state(state: &str) -> OrderStatus {
    match state {
        "live" | "pause" | "partially_effective" => OrderStatus::Open,
        "effective" => OrderStatus::Filled,
        "canceled" => OrderStatus::Cancelled,
        "order_failed" => OrderStatus::Rejected,
        _ => OrderStatus::Unknown,
    }
}

/// 解析价格字段，空串和 "-1"（市价）视为未知
fn parse_price(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|p| *p > 0.0)
}

fn format_size(quantity: f64) -> String {
    let s = format!("{:.8}", quantity);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// OKX 签名：base64(hmac_sha256(secret, timestamp + method + path + body))
pub fn sign_request(
    secret: &str,
    timestamp: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).context("Invalid API secret")?;
    mac.update(format!("{}{}{}{}", timestamp, method, request_path, body).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

pub struct OkxBrokerGateway {
    client: Client,
    base_url: String,
    /// 保证金模式 cross / isolated
    td_mode: String,
}

impl OkxBrokerGateway {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            td_mode: "cross".to_string(),
        })
    }

    pub fn with_td_mode(mut self, td_mode: impl Into<String>) -> Self {
        self.td_mode = td_mode.into();
        self
    }

    async fn send<T: DeserializeOwned>(
        &self,
        credentials: &BrokerCredentials,
        method: Method,
        request_path: &str,
        body: Option<Value>,
    ) -> Result<Vec<T>> {
        let body_str = match &body {
            Some(b) => serde_json::to_string(b)?,
            None => String::new(),
        };
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let signature = sign_request(
            &credentials.api_secret,
            &timestamp,
            method.as_str(),
            request_path,
            &body_str,
        )?;

        let mut req = self
            .client
            .request(method.clone(), format!("{}{}", self.base_url, request_path))
            .header("OK-ACCESS-KEY", &credentials.api_key)
            .header("OK-ACCESS-SIGN", signature)
            .header("OK-ACCESS-TIMESTAMP", &timestamp)
            .header(
                "OK-ACCESS-PASSPHRASE",
                credentials.passphrase.as_deref().unwrap_or_default(),
            )
            .header("Content-Type", "application/json");
        if credentials.is_sandbox {
            req = req.header("x-simulated-trading", "1");
        }
        if !body_str.is_empty() {
            req = req.body(body_str);
        }

        debug!("OKX 请求: {} {}", method, request_path);
        let response: OkxResponse<T> = req.send().await?.json().await?;
        if response.code != "0" {
            return Err(anyhow!(
                "OKX 返回错误 {} {}: code={}, msg={}",
                method,
                request_path,
                response.code,
                response.msg
            ));
        }
        Ok(response.data)
    }

    async fn set_leverage(&self, credentials: &BrokerCredentials, symbol: &str, leverage: f64) {
        let body = json!({
            "instId": symbol,
            "lever": format_size(leverage),
            "mgnMode": self.td_mode,
        });
        if let Err(e) = self
            .send::<Value>(credentials, Method::POST, "/api/v5/account/set-leverage", Some(body))
            .await
        {
            warn!("设置杠杆失败 {} x{}: {}", symbol, leverage, e);
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn place_conditional(
        &self,
        credentials: &BrokerCredentials,
        symbol: &str,
        close_side: OrderSide,
        quantity: f64,
        trigger_key: &str,
        price_key: &str,
        trigger_price: f64,
    ) -> Result<String> {
        let mut body = json!({
            "instId": symbol,
            "tdMode": self.td_mode,
            "side": close_side.as_str(),
            "ordType": "conditional",
            "sz": format_size(quantity),
            "reduceOnly": true,
        });
        body[trigger_key] = json!(trigger_price.to_string());
        body[price_key] = json!("-1");

        let acks: Vec<OkxAlgoAck> = self
            .send(credentials, Method::POST, "/api/v5/trade/order-algo", Some(body))
            .await?;
        let ack = acks
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("OKX 条件单无返回数据"))?;
        if ack.s_code != "0" && !ack.s_code.is_empty() {
            return Err(anyhow!("条件单被拒绝: {} {}", ack.s_code, ack.s_msg));
        }
        Ok(ack.algo_id)
    }

    async fn submit_market(
        &self,
        credentials: &BrokerCredentials,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        reduce_only: bool,
        client_tag: Option<&str>,
    ) -> Result<String> {
        let mut body = json!({
            "instId": symbol,
            "tdMode": self.td_mode,
            "side": side.as_str(),
            "ordType": "market",
            "sz": format_size(quantity),
        });
        if reduce_only {
            body["reduceOnly"] = json!(true);
        }
        if let Some(tag) = client_tag {
            body["clOrdId"] = json!(tag);
        }

        let acks: Vec<OkxOrderAck> = self
            .send(credentials, Method::POST, "/api/v5/trade/order", Some(body))
            .await?;
        let ack = acks
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("OKX 下单无返回数据"))?;
        if ack.s_code != "0" && !ack.s_code.is_empty() {
            return Err(anyhow!("下单被拒绝: {} {}", ack.s_code, ack.s_msg));
        }
        Ok(ack.ord_id)
    }

    async fn query_order(
        &self,
        credentials: &BrokerCredentials,
        symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatusReport> {
        let path = format!("/api/v5/trade/order?instId={}&ordId={}", symbol, order_id);
        let details: Vec<OkxOrderDetail> = self.send(credentials, Method::GET, &path, None).await?;
        let detail = details
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("订单不存在: {}", order_id))?;
        Ok(OrderStatusReport {
            order_id: detail.ord_id,
            status: map_order_state(&detail.state),
            filled_quantity: detail.acc_fill_sz.parse().unwrap_or(0.0),
            average_price: parse_price(&detail.avg_px),
        })
    }

    async fn query_algo(
        &self,
        credentials: &BrokerCredentials,
        order_id: &str,
    ) -> Result<OrderStatusReport> {
        let path = format!("/api/v5/trade/order-algo?algoId={}", order_id);
        let details: Vec<OkxAlgoDetail> = self.send(credentials, Method::GET, &path, None).await?;
        let detail = details
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("条件单不存在: {}", order_id))?;
        Ok(OrderStatusReport {
            order_id: detail.algo_id,
            status: map_algo_state(&detail.state),
            filled_quantity: detail.actual_sz.parse().unwrap_or(0.0),
            average_price: parse_price(&detail.actual_px),
        })
    }
}

#[async_trait]
impl BrokerGateway for OkxBrokerGateway {
    fn name(&self) -> &'static str {
        "okx"
    }

    async fn get_order_status(
        &self,
        credentials: &BrokerCredentials,
        symbol: &str,
        order_id: &str,
    ) -> Result<OrderStatusReport> {
        match self.query_order(credentials, symbol, order_id).await {
            Ok(report) => Ok(report),
            Err(order_err) => self.query_algo(credentials, order_id).await.map_err(|algo_err| {
                anyhow!(
                    "查询订单 {} 失败: order={}, algo={}",
                    order_id,
                    order_err,
                    algo_err
                )
            }),
        }
    }

    async fn place_order(
        &self,
        credentials: &BrokerCredentials,
        request: &OrderRequest,
    ) -> Result<OrderPlacement> {
        if request.leverage > 1.0 {
            self.set_leverage(credentials, &request.symbol, request.leverage)
                .await;
        }

        let order_id = self
            .submit_market(
                credentials,
                &request.symbol,
                request.side,
                request.quantity,
                false,
                request.client_tag.as_deref(),
            )
            .await?;
        info!(
            "✅ OKX 开仓成功: {} {} {} ordId={}",
            request.symbol,
            request.side.as_str(),
            request.quantity,
            order_id
        );

        // 开仓已成交，条件单失败只记录，不影响开仓结果
        let close_side = request.side.opposite();
        let mut stop_loss_order_id = None;
        if let Some(sl) = request.stop_loss {
            match self
                .place_conditional(
                    credentials,
                    &request.symbol,
                    close_side,
                    request.quantity,
                    "slTriggerPx",
                    "slOrdPx",
                    sl,
                )
                .await
            {
                Ok(id) => stop_loss_order_id = Some(id),
                Err(e) => warn!("止损单提交失败 {} sl={}: {}", request.symbol, sl, e),
            }
        }
        let mut take_profit_order_id = None;
        if let Some(tp) = request.take_profit {
            match self
                .place_conditional(
                    credentials,
                    &request.symbol,
                    close_side,
                    request.quantity,
                    "tpTriggerPx",
                    "tpOrdPx",
                    tp,
                )
                .await
            {
                Ok(id) => take_profit_order_id = Some(id),
                Err(e) => warn!("止盈单提交失败 {} tp={}: {}", request.symbol, tp, e),
            }
        }

        Ok(OrderPlacement {
            order_id,
            stop_loss_order_id,
            take_profit_order_id,
            fill_price: None,
        })
    }

    async fn place_market_order(
        &self,
        credentials: &BrokerCredentials,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<OrderPlacement> {
        let order_id = self
            .submit_market(credentials, symbol, side, quantity, true, None)
            .await?;
        Ok(OrderPlacement {
            order_id,
            ..Default::default()
        })
    }

    async fn cancel_order(
        &self,
        credentials: &BrokerCredentials,
        symbol: &str,
        order_id: &str,
    ) -> Result<()> {
        let body = json!({ "instId": symbol, "ordId": order_id });
        let order_result = self
            .send::<Value>(credentials, Method::POST, "/api/v5/trade/cancel-order", Some(body))
            .await;
        if order_result.is_ok() {
            return Ok(());
        }

        let body = json!([{ "algoId": order_id, "instId": symbol }]);
        self.send::<Value>(credentials, Method::POST, "/api/v5/trade/cancel-algos", Some(body))
            .await
            .map(|_| ())
    }
}
