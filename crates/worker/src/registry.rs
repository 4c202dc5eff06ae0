//! 集群注册表
//!
//! 记录每个任务归属哪个实例，归属实例定期刷新心跳，心跳过期的记录会被清理，
//! 之后任何实例都可以重新认领。执行互斥仍然由执行锁保证。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use scheduler_core::{
    config::AppConfig,
    keys::KeySpace,
    traits::{LockService, RegistryStore},
    DescriptorSnapshot, SchedulerResult, TaskDescriptor,
};
use scheduler_infrastructure::MetricsCollector;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub heartbeat_interval: Duration,
    /// 心跳刷新周期，应明显小于心跳间隔
    pub heartbeat_tick: Duration,
    pub cleanup_interval: Duration,
    pub lock_wait: Duration,
    pub lock_lease: Duration,
}

impl RegistrySettings {
    pub fn snapshot_ttl(&self) -> Duration {
        self.heartbeat_interval * 3
    }

    /// 心跳键的TTL，同时也是判定过期的阈值
    pub fn heartbeat_ttl(&self) -> Duration {
        self.heartbeat_interval * 2
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RegistrySettings {
    fn from(config: &AppConfig) -> Self {
        let registry = &config.registry;
        Self {
            heartbeat_interval: Duration::from_secs(registry.heartbeat_interval_seconds),
            heartbeat_tick: Duration::from_secs(registry.heartbeat_tick_seconds),
            cleanup_interval: Duration::from_secs(registry.cleanup_interval_seconds),
            lock_wait: Duration::from_secs(registry.lock_wait_seconds),
            lock_lease: Duration::from_secs(registry.lock_lease_seconds),
        }
    }
}

/// 一轮心跳的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub refreshed: usize,
    /// 已被其他实例认领的任务，本实例应停止调度
    pub lost: Vec<String>,
}

pub struct ClusterRegistry {
    instance_id: String,
    store: Arc<dyn RegistryStore>,
    lock: Arc<dyn LockService>,
    keys: KeySpace,
    settings: RegistrySettings,
    owned: RwLock<HashMap<String, Arc<TaskDescriptor>>>,
    metrics: MetricsCollector,
}

impl ClusterRegistry {
    pub fn new(
        instance_id: impl Into<String>,
        store: Arc<dyn RegistryStore>,
        lock: Arc<dyn LockService>,
        keys: KeySpace,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            store,
            lock,
            keys,
            settings,
            owned: RwLock::new(HashMap::new()),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// 在任务名粒度的注册表锁下执行操作，拿不到锁时返回 `None`
    async fn with_registry_lock<T, F, Fut>(&self, task_name: &str, op: F) -> SchedulerResult<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = SchedulerResult<T>>,
    {
        let lock_key = self.keys.registry_lock(task_name);
        if !self
            .lock
            .try_lock(&lock_key, self.settings.lock_wait, self.settings.lock_lease)
            .await?
        {
            return Ok(None);
        }

        let result = op().await;

        if let Err(e) = self.lock.unlock(&lock_key).await {
            error!("释放注册表锁 {} 失败: {}", lock_key, e);
        }
        result.map(Some)
    }

    async fn write_records(&self, descriptor: &TaskDescriptor) -> SchedulerResult<()> {
        let now = Utc::now();
        descriptor.set_owner(&self.instance_id, now);
        let payload = descriptor.snapshot().to_json()?;

        self.store
            .put_snapshot(&descriptor.name, &payload, self.settings.snapshot_ttl())
            .await?;
        self.store
            .set_owner(&descriptor.name, &self.instance_id)
            .await?;
        self.store
            .put_heartbeat(
                &descriptor.name,
                now.timestamp_millis(),
                self.settings.heartbeat_ttl(),
            )
            .await?;
        Ok(())
    }

    /// 尝试认领任务
    ///
    /// 任务无归属或已归属本实例时写入记录并返回 `true`；归属其他实例时返回 `false`，
    /// 调用方不应在本地调度该任务。
    pub async fn register_ownership(&self, descriptor: &Arc<TaskDescriptor>) -> SchedulerResult<bool> {
        let name = descriptor.name.as_str();
        let claimed = self
            .with_registry_lock(name, || async move {
                match self.store.get_owner(name).await? {
                    Some(owner) if owner != self.instance_id => {
                        debug!("任务 {} 已归属实例 {}", name, owner);
                        Ok(false)
                    }
                    _ => {
                        self.write_records(descriptor).await?;
                        Ok(true)
                    }
                }
            })
            .await?;

        match claimed {
            Some(true) => {
                self.owned
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(name.to_string(), Arc::clone(descriptor));
                info!("实例 {} 认领任务 {}", self.instance_id, name);
                Ok(true)
            }
            Some(false) => Ok(false),
            None => {
                warn!("获取任务 {} 的注册表锁超时，暂不认领", name);
                Ok(false)
            }
        }
    }

    /// 释放本实例对任务的归属，只有记录中的归属实例才能清除记录
    pub async fn unregister_ownership(&self, task_name: &str) -> SchedulerResult<bool> {
        self.owned
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(task_name);

        let released = self
            .with_registry_lock(task_name, || async move {
                match self.store.get_owner(task_name).await? {
                    Some(owner) if owner == self.instance_id => {
                        self.store.delete_snapshot(task_name).await?;
                        self.store.delete_heartbeat(task_name).await?;
                        self.store.remove_owner(task_name).await?;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            })
            .await?;

        match released {
            Some(true) => {
                info!("实例 {} 释放任务 {}", self.instance_id, task_name);
                Ok(true)
            }
            Some(false) => Ok(false),
            None => {
                warn!("获取任务 {} 的注册表锁超时，未能释放归属", task_name);
                Ok(false)
            }
        }
    }

    /// 刷新本实例所有任务的快照和心跳
    ///
    /// 记录已被清理（无归属）的任务会被重新写入；已被其他实例认领的任务
    /// 从本地移除并在报告中返回。单个任务出错只记录日志。
    pub async fn heartbeat(&self) -> HeartbeatReport {
        let owned: Vec<Arc<TaskDescriptor>> = self
            .owned
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        let mut report = HeartbeatReport::default();
        for descriptor in owned {
            let name = descriptor.name.as_str();
            let current = descriptor.as_ref();
            let result = self
                .with_registry_lock(name, || async move {
                    match self.store.get_owner(name).await? {
                        Some(owner) if owner != self.instance_id => Ok(false),
                        _ => {
                            self.write_records(current).await?;
                            Ok(true)
                        }
                    }
                })
                .await;

            match result {
                Ok(Some(true)) => report.refreshed += 1,
                Ok(Some(false)) => {
                    warn!("任务 {} 已被其他实例认领，停止本地心跳", name);
                    self.owned
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(name);
                    descriptor.clear_owner();
                    report.lost.push(name.to_string());
                }
                Ok(None) => debug!("任务 {} 的注册表锁被占用，跳过本轮心跳", name),
                Err(e) => warn!("刷新任务 {} 的心跳失败: {}", name, e),
            }
        }
        report
    }

    /// 清理心跳缺失或过期的记录，返回被清理的任务名
    pub async fn cleanup_expired(&self) -> Vec<String> {
        let owners = match self.store.owners().await {
            Ok(owners) => owners,
            Err(e) => {
                warn!("读取任务归属映射失败: {}", e);
                return Vec::new();
            }
        };

        let threshold_ms = self.settings.heartbeat_ttl().as_millis() as i64;
        let mut reclaimed = Vec::new();
        for name in owners.keys() {
            let result = self
                .with_registry_lock(name, || async move {
                    let now_ms = Utc::now().timestamp_millis();
                    let stale = match self.store.get_heartbeat(name).await? {
                        Some(last) => now_ms - last > threshold_ms,
                        None => true,
                    };
                    if stale {
                        self.store.delete_snapshot(name).await?;
                        self.store.remove_owner(name).await?;
                        self.store.delete_heartbeat(name).await?;
                    }
                    Ok(stale)
                })
                .await;

            match result {
                Ok(Some(true)) => {
                    info!("已清理过期任务: {}", name);
                    reclaimed.push(name.clone());
                }
                Ok(_) => {}
                Err(e) => warn!("清理任务 {} 失败: {}", name, e),
            }
        }

        if !reclaimed.is_empty() {
            self.metrics.record_registry_reclaimed(reclaimed.len() as u64);
        }
        reclaimed
    }

    pub async fn registered_instance(&self, task_name: &str) -> SchedulerResult<Option<String>> {
        self.store.get_owner(task_name).await
    }

    pub async fn is_registered(&self, task_name: &str) -> SchedulerResult<bool> {
        Ok(self.store.get_owner(task_name).await?.is_some())
    }

    pub fn owns_locally(&self, task_name: &str) -> bool {
        self.owned
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(task_name)
    }

    /// 本实例持有的任务快照
    pub fn local_tasks(&self) -> Vec<DescriptorSnapshot> {
        let mut snapshots: Vec<DescriptorSnapshot> = self
            .owned
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|d| d.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// 共享存储中所有仍然有效的任务快照
    pub async fn cluster_tasks(&self) -> SchedulerResult<Vec<DescriptorSnapshot>> {
        let owners = self.store.owners().await?;
        let mut snapshots = Vec::with_capacity(owners.len());
        for name in owners.keys() {
            if let Some(payload) = self.store.get_snapshot(name).await? {
                match DescriptorSnapshot::from_json(&payload) {
                    Ok(snapshot) => snapshots.push(snapshot),
                    Err(e) => warn!("解析任务 {} 的快照失败: {}", name, e),
                }
            }
        }
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(snapshots)
    }
}
