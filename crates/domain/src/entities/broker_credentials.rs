//! 券商API凭证实体

use serde::{Deserialize, Serialize};

/// 券商API凭证
#[derive(Clone, Serialize, Deserialize)]
pub struct BrokerCredentials {
    pub id: String,
    /// 交易所名称（如 "okx"）
    pub exchange_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Passphrase（OKX需要）
    pub passphrase: Option<String>,
    /// 是否模拟盘
    pub is_sandbox: bool,
}

impl BrokerCredentials {
    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.is_empty() {
            return Err("API Key不能为空".to_string());
        }
        if self.api_secret.is_empty() {
            return Err("API Secret不能为空".to_string());
        }
        if self.exchange_name.eq_ignore_ascii_case("okx") && self.passphrase.is_none() {
            return Err("OKX交易所需要Passphrase".to_string());
        }
        Ok(())
    }
}

// 日志中不输出密钥
impl std::fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerCredentials")
            .field("id", &self.id)
            .field("exchange_name", &self.exchange_name)
            .field("api_key", &"***")
            .field("is_sandbox", &self.is_sandbox)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> BrokerCredentials {
        BrokerCredentials {
            id: "c1".to_string(),
            exchange_name: "okx".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            passphrase: Some("pass".to_string()),
            is_sandbox: true,
        }
    }

    #[test]
    fn test_okx_requires_passphrase() {
        let mut c = credentials();
        assert!(c.validate().is_ok());
        c.passphrase = None;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let printed = format!("{:?}", credentials());
        assert!(!printed.contains("secret"));
    }
}
