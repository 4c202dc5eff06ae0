use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use scheduler_core::{traits::RegistryStore, SchedulerResult};
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Expiring<T> {
    fn live(&self) -> Option<T> {
        (self.expires_at > Instant::now()).then(|| self.value.clone())
    }
}

#[derive(Debug, Default)]
struct Tables {
    snapshots: HashMap<String, Expiring<String>>,
    heartbeats: HashMap<String, Expiring<i64>>,
    owners: HashMap<String, String>,
}

/// 进程内注册表存储，按TTL模拟键过期
///
/// 多个注册表实例共享同一个 `Arc<InMemoryRegistryStore>` 即可模拟集群。
#[derive(Debug, Default)]
pub struct InMemoryRegistryStore {
    tables: Mutex<Tables>,
}

impl InMemoryRegistryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn put_snapshot(
        &self,
        task_name: &str,
        payload: &str,
        ttl: Duration,
    ) -> SchedulerResult<()> {
        self.tables().snapshots.insert(
            task_name.to_string(),
            Expiring {
                value: payload.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_snapshot(&self, task_name: &str) -> SchedulerResult<Option<String>> {
        Ok(self.tables().snapshots.get(task_name).and_then(Expiring::live))
    }

    async fn delete_snapshot(&self, task_name: &str) -> SchedulerResult<()> {
        self.tables().snapshots.remove(task_name);
        Ok(())
    }

    async fn put_heartbeat(
        &self,
        task_name: &str,
        epoch_ms: i64,
        ttl: Duration,
    ) -> SchedulerResult<()> {
        self.tables().heartbeats.insert(
            task_name.to_string(),
            Expiring {
                value: epoch_ms,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_heartbeat(&self, task_name: &str) -> SchedulerResult<Option<i64>> {
        Ok(self.tables().heartbeats.get(task_name).and_then(Expiring::live))
    }

    async fn delete_heartbeat(&self, task_name: &str) -> SchedulerResult<()> {
        self.tables().heartbeats.remove(task_name);
        Ok(())
    }

    async fn get_owner(&self, task_name: &str) -> SchedulerResult<Option<String>> {
        Ok(self.tables().owners.get(task_name).cloned())
    }

    async fn set_owner(&self, task_name: &str, instance_id: &str) -> SchedulerResult<()> {
        self.tables()
            .owners
            .insert(task_name.to_string(), instance_id.to_string());
        Ok(())
    }

    async fn remove_owner(&self, task_name: &str) -> SchedulerResult<()> {
        self.tables().owners.remove(task_name);
        Ok(())
    }

    async fn owners(&self) -> SchedulerResult<HashMap<String, String>> {
        Ok(self.tables().owners.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_and_heartbeat_expire() {
        let store = InMemoryRegistryStore::new();
        store
            .put_snapshot("job", "{}", Duration::from_secs(90))
            .await
            .unwrap();
        store
            .put_heartbeat("job", 1_700_000_000_000, Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(store.get_heartbeat("job").await.unwrap().is_none());
        assert_eq!(store.get_snapshot("job").await.unwrap().as_deref(), Some("{}"));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(store.get_snapshot("job").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_owner_map() {
        let store = InMemoryRegistryStore::new();
        store.set_owner("a", "node-1:8080").await.unwrap();
        store.set_owner("b", "node-2:8080").await.unwrap();
        assert_eq!(store.get_owner("a").await.unwrap().as_deref(), Some("node-1:8080"));

        store.remove_owner("a").await.unwrap();
        let owners = store.owners().await.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners.get("b").map(String::as_str), Some("node-2:8080"));
    }
}
