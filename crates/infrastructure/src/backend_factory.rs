use std::sync::Arc;
use std::time::Duration;

use scheduler_core::{
    config::{AppConfig, BackendKind},
    keys::KeySpace,
    traits::{LockService, RegistryStore},
    SchedulerResult,
};
use tracing::info;

use crate::lock::{InMemoryLockService, InMemoryLockStore, RedisLockService};
use crate::redis_connection::RedisConnectionManager;
use crate::registry_store::{InMemoryRegistryStore, RedisRegistryStore};

/// 一个实例使用的锁服务与注册表存储
#[derive(Clone)]
pub struct ClusterBackends {
    pub lock: Arc<dyn LockService>,
    pub store: Arc<dyn RegistryStore>,
    pub keys: KeySpace,
}

pub struct BackendFactory;

impl BackendFactory {
    pub async fn create(config: &AppConfig, instance_id: &str) -> SchedulerResult<ClusterBackends> {
        let keys = KeySpace::new(config.backend.key_prefix.clone());
        let retry_interval = Duration::from_millis(config.lock.retry_interval_ms);

        match config.backend.kind {
            BackendKind::Redis => {
                info!("使用Redis后端: {}", config.backend.redis_url);
                let connection = RedisConnectionManager::connect(
                    &config.backend.redis_url,
                    Duration::from_secs(config.backend.connect_timeout_seconds),
                )
                .await?;
                Ok(ClusterBackends {
                    lock: Arc::new(RedisLockService::new(
                        connection.clone(),
                        instance_id,
                        retry_interval,
                    )),
                    store: Arc::new(RedisRegistryStore::new(connection, keys.clone())),
                    keys,
                })
            }
            BackendKind::Memory => {
                info!("使用进程内后端，仅适用于单实例部署");
                Ok(Self::in_memory(
                    InMemoryLockStore::new(),
                    InMemoryRegistryStore::new(),
                    instance_id,
                    keys,
                    retry_interval,
                ))
            }
        }
    }

    /// 基于共享的进程内存储构造后端，多次调用可模拟多个实例
    pub fn in_memory(
        lock_store: Arc<InMemoryLockStore>,
        registry_store: Arc<InMemoryRegistryStore>,
        instance_id: &str,
        keys: KeySpace,
        retry_interval: Duration,
    ) -> ClusterBackends {
        ClusterBackends {
            lock: Arc::new(
                InMemoryLockService::new(lock_store, instance_id)
                    .with_retry_interval(retry_interval),
            ),
            store: registry_store,
            keys,
        }
    }
}
