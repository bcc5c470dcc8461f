//! 策略执行锁
//!
//! 同一 (strategy_id, interval_key) 只允许一个 worker 执行。
//! 获取失败立即返回 false；策略执行锁只靠 TTL 过期释放

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use quant_relay_core::cache::{execution_lock_key, get_redis_connection};
use quant_relay_domain::traits::ExecutionLockStore;

/// Redis 执行锁：`SET key worker NX PX ttl`
pub struct RedisExecutionLock {
    key_prefix: String,
}

impl RedisExecutionLock {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
        }
    }
}

#[async_trait]
impl ExecutionLockStore for RedisExecutionLock {
    async fn try_acquire(
        &self,
        strategy_id: &str,
        interval_key: &str,
        worker_id: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let key = execution_lock_key(&self.key_prefix, strategy_id, interval_key);
        let mut conn = get_redis_connection().await?;

        // NX 未写入时返回 nil
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(worker_id)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        let acquired = reply.is_some();
        debug!(key = %key, worker_id, acquired, "Redis 执行锁");
        Ok(acquired)
    }

    async fn release(&self, scope: &str, key: &str, worker_id: &str) -> Result<bool> {
        let key = execution_lock_key(&self.key_prefix, scope, key);
        let mut conn = get_redis_connection().await?;

        // 比较持有者后删除，必须在同一个脚本里完成
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&key)
            .arg(worker_id)
            .invoke_async(&mut conn)
            .await?;
        debug!(key = %key, worker_id, deleted, "释放 Redis 锁");
        Ok(deleted == 1)
    }
}

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Debug, Clone)]
struct LockEntry {
    worker_id: String,
    expire_at: Instant,
}

/// 进程内执行锁（测试与单机运行）
#[derive(Clone, Default)]
pub struct InMemoryExecutionLock {
    locks: Arc<DashMap<String, LockEntry>>,
}

impl InMemoryExecutionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前持有者（未过期时）
    pub fn holder(&self, strategy_id: &str, interval_key: &str) -> Option<String> {
        let key = format!("{}:{}", strategy_id, interval_key);
        self.locks
            .get(&key)
            .filter(|entry| entry.expire_at > Instant::now())
            .map(|entry| entry.worker_id.clone())
    }
}

#[async_trait]
impl ExecutionLockStore for InMemoryExecutionLock {
    async fn try_acquire(
        &self,
        strategy_id: &str,
        interval_key: &str,
        worker_id: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let key = format!("{}:{}", strategy_id, interval_key);
        let now = Instant::now();
        let fresh = LockEntry {
            worker_id: worker_id.to_string(),
            expire_at: now + ttl,
        };

        // entry 持有分片写锁，检查与写入是原子的
        let acquired = match self.locks.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expire_at <= now {
                    occupied.insert(fresh);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
        };
        Ok(acquired)
    }

    async fn release(&self, scope: &str, key: &str, worker_id: &str) -> Result<bool> {
        let key = format!("{}:{}", scope, key);
        let removed = self
            .locks
            .remove_if(&key, |_, entry| entry.worker_id == worker_id)
            .is_some();
        Ok(removed)
    }
}
