//! 券商网关工厂
//!
//! 根据配置创建券商网关，支持依赖注入

use std::sync::Arc;

use anyhow::{anyhow, Result};
use quant_relay_domain::traits::BrokerGateway;

use super::{OkxBrokerGateway, PaperBrokerGateway};

pub struct BrokerGatewayFactory;

impl BrokerGatewayFactory {
    /// 创建券商网关
    ///
    /// # Arguments
    /// * `exchange_name` - 券商名称（"okx", "paper"）
    /// * `base_url` - REST 接口地址（paper 忽略）
    pub fn create(exchange_name: &str, base_url: &str) -> Result<Arc<dyn BrokerGateway>> {
        match exchange_name.to_lowercase().as_str() {
            "okx" => Ok(Arc::new(OkxBrokerGateway::new(base_url)?)),
            "paper" => Ok(Arc::new(PaperBrokerGateway::new())),
            _ => Err(anyhow!("不支持的券商: {}", exchange_name)),
        }
    }
}
