use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, warn};

use quant_relay_domain::traits::EventPublisher;
use quant_relay_domain::{PositionSide, RelayEvent};

/// Telegram Bot 通知服务
pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    /// 从环境变量创建通知器
    /// 需要设置: TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID
    pub fn from_env() -> Result<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| anyhow::anyhow!("TELEGRAM_BOT_TOKEN not set"))?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID")
            .map_err(|_| anyhow::anyhow!("TELEGRAM_CHAT_ID not set"))?;

        Ok(Self::new(bot_token, chat_id))
    }

    /// 发送文本消息 (Markdown 格式)
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);

        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if response.status().is_success() {
            info!("📨 Telegram message sent successfully");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Failed to send Telegram message: {} - {}", status, body);
            Err(anyhow::anyhow!("Telegram API error: {}", status))
        }
    }

    /// 需要推送的事件转换为消息，其余事件返回 None
    pub fn format_event(event: &RelayEvent) -> Option<String> {
        match event {
            RelayEvent::ExecutionFailed {
                strategy_id,
                interval_key,
                error,
            } => Some(format!(
                "❌ *策略执行失败*\n\n\
                 *策略*: `{}`\n\
                 *周期*: {}\n\
                 *错误*: {}\n",
                strategy_id,
                interval_key.as_deref().unwrap_or("-"),
                error
            )),
            RelayEvent::PositionOpened {
                strategy_id,
                symbol,
                side,
                quantity,
                entry_price,
                ..
            } => {
                let emoji = match side {
                    PositionSide::Long => "🟢",
                    PositionSide::Short => "🔴",
                };
                Some(format!(
                    "{} *开仓*\n\n\
                     *策略*: `{}`\n\
                     *币种*: `{}`\n\
                     *方向*: {}\n\
                     *数量*: {:.6}\n\
                     *价格*: {}\n",
                    emoji,
                    strategy_id,
                    symbol,
                    side.as_str(),
                    quantity,
                    entry_price
                ))
            }
            RelayEvent::PositionClosed {
                symbol,
                exit_reason,
                exit_price,
                pnl,
                pnl_percent,
                ..
            } => {
                let emoji = if *pnl >= 0.0 { "🚀" } else { "📉" };
                Some(format!(
                    "{} *平仓*\n\n\
                     *币种*: `{}`\n\
                     *原因*: {}\n\
                     *价格*: {}\n\
                     *盈亏*: {:.4} ({:+.2}%)\n",
                    emoji, symbol, exit_reason, exit_price, pnl, pnl_percent
                ))
            }
            RelayEvent::ExecutionStarted { .. } | RelayEvent::ExecutionCompleted { .. } => None,
        }
    }
}

#[async_trait]
impl EventPublisher for TelegramNotifier {
    async fn publish(&self, event: RelayEvent) {
        let Some(message) = Self::format_event(&event) else {
            return;
        };
        if let Err(e) = self.send_message(&message).await {
            warn!("Telegram 通知失败 event={}: {}", event.name(), e);
        }
    }
}
