//! 本地任务目录
//!
//! 按名称索引任务描述，并维护分组成员列表（按 `order` 和注册顺序排序）。
//! 目录只记录本实例的信息，跨实例的可见性由集群注册表提供。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use scheduler_core::{errors::SchedulerError, SchedulerResult, TaskDescriptor};
use tracing::{info, warn};

#[derive(Clone)]
struct CatalogEntry {
    seq: u64,
    descriptor: Arc<TaskDescriptor>,
}

#[derive(Default)]
struct CatalogState {
    tasks: HashMap<String, CatalogEntry>,
    groups: BTreeMap<String, Vec<CatalogEntry>>,
    next_seq: u64,
}

#[derive(Default)]
pub struct TaskCatalog {
    state: RwLock<CatalogState>,
}

impl TaskCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 登记任务，同名任务已存在时拒绝
    pub fn register(&self, descriptor: Arc<TaskDescriptor>) -> SchedulerResult<()> {
        let mut state = self.write();
        if state.tasks.contains_key(&descriptor.name) {
            warn!("任务名称重复，拒绝注册: {}", descriptor.name);
            return Err(SchedulerError::DuplicateTask {
                name: descriptor.name.clone(),
            });
        }

        let entry = CatalogEntry {
            seq: state.next_seq,
            descriptor: Arc::clone(&descriptor),
        };
        state.next_seq += 1;
        state.tasks.insert(descriptor.name.clone(), entry.clone());

        let members = state.groups.entry(descriptor.group.clone()).or_default();
        members.push(entry);
        members.sort_by_key(|e| (e.descriptor.order, e.seq));

        info!(
            "任务已登记: {} (分组: {}, 顺序: {})",
            descriptor.name, descriptor.group, descriptor.order
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<TaskDescriptor>> {
        self.read()
            .tasks
            .get(name)
            .map(|entry| Arc::clone(&entry.descriptor))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().tasks.contains_key(name)
    }

    /// 全部任务，按分组名、组内顺序排列
    pub fn list_all(&self) -> Vec<Arc<TaskDescriptor>> {
        self.read()
            .groups
            .values()
            .flat_map(|members| members.iter().map(|e| Arc::clone(&e.descriptor)))
            .collect()
    }

    pub fn list_groups(&self) -> Vec<String> {
        self.read().groups.keys().cloned().collect()
    }

    pub fn group_members(&self, group: &str) -> Vec<Arc<TaskDescriptor>> {
        self.read()
            .groups
            .get(group)
            .map(|members| members.iter().map(|e| Arc::clone(&e.descriptor)).collect())
            .unwrap_or_default()
    }

    /// 移除任务：先取消定时器订阅，再标记为已注销
    pub fn unregister(&self, name: &str) -> Option<Arc<TaskDescriptor>> {
        let removed = {
            let mut state = self.write();
            let entry = state.tasks.remove(name)?;
            let group = entry.descriptor.group.clone();
            if let Some(members) = state.groups.get_mut(&group) {
                members.retain(|e| e.descriptor.name != name);
                if members.is_empty() {
                    state.groups.remove(&group);
                }
            }
            entry.descriptor
        };

        removed.retire();
        info!("任务已移除: {}", name);
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
