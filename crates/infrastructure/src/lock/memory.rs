use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use scheduler_core::{traits::LockService, SchedulerResult};
use tokio::time::Instant;
use tracing::debug;

use super::client_token;

#[derive(Debug, Clone)]
struct LockEntry {
    token: String,
    expires_at: Instant,
}

/// 进程内的锁表，多个 [`InMemoryLockService`] 共享同一个实例
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl InMemoryLockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, LockEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => false,
            _ => {
                entries.insert(
                    key.to_string(),
                    LockEntry {
                        token: token.to_string(),
                        expires_at: now + lease,
                    },
                );
                true
            }
        }
    }

    fn release(&self, key: &str, token: &str) -> bool {
        let mut entries = self.entries();
        let held = entries
            .get(key)
            .is_some_and(|entry| entry.token == token && entry.expires_at > Instant::now());
        if held {
            entries.remove(key);
        }
        held
    }

    /// 当前持有者的令牌，已过期的锁视为未持有
    pub fn holder(&self, key: &str) -> Option<String> {
        self.entries()
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.token.clone())
    }
}

/// 基于 [`InMemoryLockStore`] 的锁客户端
///
/// 用于单实例部署，以及在一个进程内模拟多个实例的测试。
pub struct InMemoryLockService {
    store: Arc<InMemoryLockStore>,
    token: String,
    retry_interval: Duration,
}

impl InMemoryLockService {
    pub fn new(store: Arc<InMemoryLockStore>, instance_id: &str) -> Self {
        Self {
            store,
            token: client_token(instance_id),
            retry_interval: Duration::from_millis(10),
        }
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn try_lock(&self, key: &str, wait: Duration, lease: Duration) -> SchedulerResult<bool> {
        let deadline = Instant::now() + wait;
        loop {
            if self.store.try_acquire(key, &self.token, lease) {
                debug!("获取锁成功: {key}");
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.retry_interval.min(deadline - now)).await;
        }
    }

    async fn unlock(&self, key: &str) -> SchedulerResult<()> {
        if !self.store.release(key, &self.token) {
            debug!("锁未被当前客户端持有，忽略释放: {key}");
        }
        Ok(())
    }

    async fn is_held_by_caller(&self, key: &str) -> SchedulerResult<bool> {
        Ok(self.store.holder(key).as_deref() == Some(self.token.as_str()))
    }
}
