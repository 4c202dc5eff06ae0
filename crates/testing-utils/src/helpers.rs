//! 测试辅助工具

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use scheduler_core::keys::KeySpace;
use scheduler_infrastructure::{
    BackendFactory, ClusterBackends, InMemoryLockStore, InMemoryRegistryStore,
};

/// 初始化测试日志，重复调用无副作用
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// 轮询直到条件成立或超时，返回条件最终是否成立
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// 异步条件版本的 [`wait_until`]
pub async fn wait_until_async<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// 共享进程内存储的模拟集群，每个实例拿到独立令牌的锁客户端
#[derive(Clone, Default)]
pub struct InMemoryCluster {
    pub lock_store: Arc<InMemoryLockStore>,
    pub registry_store: Arc<InMemoryRegistryStore>,
    pub keys: KeySpace,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backends(&self, instance_id: &str) -> ClusterBackends {
        BackendFactory::in_memory(
            Arc::clone(&self.lock_store),
            Arc::clone(&self.registry_store),
            instance_id,
            self.keys.clone(),
            Duration::from_millis(5),
        )
    }
}
