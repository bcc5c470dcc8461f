//! 券商凭证仓储实现

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{FromRow, MySql, Pool};

use quant_relay_domain::traits::BrokerCredentialsRepository;
use quant_relay_domain::BrokerCredentials;

/// 券商凭证数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct BrokerCredentialsEntity {
    pub id: String,
    pub exchange_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: Option<String>,
    pub is_sandbox: i8, // MySQL tinyint(1)
}

impl BrokerCredentialsEntity {
    pub fn to_domain(&self) -> BrokerCredentials {
        BrokerCredentials {
            id: self.id.clone(),
            exchange_name: self.exchange_name.clone(),
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
            passphrase: self.passphrase.clone(),
            is_sandbox: self.is_sandbox != 0,
        }
    }
}

pub struct SqlxBrokerCredentialsRepository {
    pool: Pool<MySql>,
}

impl SqlxBrokerCredentialsRepository {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BrokerCredentialsRepository for SqlxBrokerCredentialsRepository {
    async fn find_by_id(&self, credentials_id: &str) -> Result<Option<BrokerCredentials>> {
        let entity = sqlx::query_as::<_, BrokerCredentialsEntity>(
            "SELECT id, exchange_name, api_key, api_secret, passphrase, is_sandbox
             FROM relay_broker_credentials
             WHERE id = ? AND is_enabled = 1
             LIMIT 1",
        )
        .bind(credentials_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entity.map(|e| e.to_domain()))
    }
}
