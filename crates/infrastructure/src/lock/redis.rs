use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use redis::Script;
use scheduler_core::{errors::SchedulerError, traits::LockService, SchedulerResult};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::client_token;
use crate::redis_connection::RedisConnectionManager;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// 基于Redis的集群锁
///
/// 加锁使用 `SET key token NX PX lease`，释放通过Lua脚本比较令牌后删除。
pub struct RedisLockService {
    connection: RedisConnectionManager,
    token: String,
    retry_interval: Duration,
    release_script: Script,
}

impl RedisLockService {
    pub fn new(
        connection: RedisConnectionManager,
        instance_id: &str,
        retry_interval: Duration,
    ) -> Self {
        Self {
            connection,
            token: client_token(instance_id),
            retry_interval,
            release_script: Script::new(RELEASE_SCRIPT),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    async fn set_nx(&self, key: &str, lease: Duration) -> SchedulerResult<bool> {
        let mut conn = self.connection.connection();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&self.token)
            .arg("NX")
            .arg("PX")
            .arg(lease.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| SchedulerError::Lock(format!("获取锁 {key} 失败: {e}")))?;
        Ok(reply.is_some())
    }

    fn jittered_interval(&self) -> Duration {
        let base = self.retry_interval.as_millis() as u64;
        let jitter = rand::rng().random_range(0..=base / 4 + 1);
        Duration::from_millis(base + jitter)
    }
}

#[async_trait]
impl LockService for RedisLockService {
    async fn try_lock(&self, key: &str, wait: Duration, lease: Duration) -> SchedulerResult<bool> {
        let deadline = Instant::now() + wait;
        loop {
            if self.set_nx(key, lease).await? {
                debug!("获取锁成功: {key}");
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.jittered_interval().min(deadline - now)).await;
        }
    }

    async fn unlock(&self, key: &str) -> SchedulerResult<()> {
        let mut conn = self.connection.connection();
        let released: i64 = match self
            .release_script
            .key(key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await
        {
            Ok(released) => released,
            Err(e) => {
                warn!("释放锁 {key} 失败: {e}");
                return Ok(());
            }
        };
        if released == 0 {
            debug!("锁未被当前客户端持有，忽略释放: {key}");
        }
        Ok(())
    }

    async fn is_held_by_caller(&self, key: &str) -> SchedulerResult<bool> {
        let mut conn = self.connection.connection();
        let holder: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| SchedulerError::Lock(format!("查询锁 {key} 失败: {e}")))?;
        Ok(holder.as_deref() == Some(self.token.as_str()))
    }
}
