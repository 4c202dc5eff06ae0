//! 调度器门面
//!
//! 负责任务注册、触发方式绑定以及整体的启动与停止。每次触发都交给
//! [`GroupDispatcher`]，从不直接调用执行器。

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use scheduler_core::{
    DescriptorSnapshot, ExecutionStats, ScheduleState, SchedulerError, SchedulerResult,
    TaskDescriptor,
};
use scheduler_worker::{
    ClusterRegistry, ExecutionOutcome, MaintenanceListener, MaintenanceReport,
    RegistryMaintenance, TaskExecutor,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalog::TaskCatalog;
use crate::group_dispatcher::{DispatcherSettings, GroupDispatcher};
use crate::timer;

pub struct SchedulerBuilder {
    executor: Arc<TaskExecutor>,
    dispatcher_settings: DispatcherSettings,
    registry: Option<Arc<ClusterRegistry>>,
}

impl SchedulerBuilder {
    pub fn new(executor: Arc<TaskExecutor>) -> Self {
        Self {
            executor,
            dispatcher_settings: DispatcherSettings::default(),
            registry: None,
        }
    }

    pub fn dispatcher_settings(mut self, settings: DispatcherSettings) -> Self {
        self.dispatcher_settings = settings;
        self
    }

    /// 启用集群注册表，未设置时所有任务都在本地调度
    pub fn registry(mut self, registry: Arc<ClusterRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Scheduler {
        let dispatcher = Arc::new(GroupDispatcher::new(
            self.executor,
            self.dispatcher_settings,
        ));
        Scheduler {
            inner: Arc::new(SchedulerInner {
                catalog: TaskCatalog::new(),
                dispatcher,
                registry: self.registry,
                standby: Mutex::new(HashSet::new()),
                started: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                maintenance: Mutex::new(None),
            }),
        }
    }
}

struct MaintenanceHandle {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

struct SchedulerInner {
    catalog: TaskCatalog,
    dispatcher: Arc<GroupDispatcher>,
    registry: Option<Arc<ClusterRegistry>>,
    /// 已被其他实例认领、等待接管的任务
    standby: Mutex<HashSet<String>>,
    started: AtomicBool,
    destroyed: AtomicBool,
    maintenance: Mutex<Option<MaintenanceHandle>>,
}

impl SchedulerInner {
    fn standby(&self) -> MutexGuard<'_, HashSet<String>> {
        self.standby.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_standby(&self, name: &str) -> bool {
        self.standby().contains(name)
    }

    fn bind(&self, descriptor: &Arc<TaskDescriptor>) -> SchedulerResult<()> {
        let trigger = descriptor.validate()?;
        let subscription = timer::bind(
            Arc::clone(descriptor),
            trigger,
            Arc::clone(&self.dispatcher),
        )?;
        descriptor.install_subscription(subscription);
        descriptor.set_schedule_state(ScheduleState::Scheduled);
        Ok(())
    }

    /// 任务可以在本实例绑定定时器
    fn is_bindable(&self, descriptor: &TaskDescriptor) -> bool {
        descriptor.enabled
            && !descriptor.is_paused()
            && !descriptor.is_retired()
            && !self.is_standby(&descriptor.name)
    }

    fn enter_standby(&self, descriptor: &TaskDescriptor) {
        descriptor.cancel_subscription();
        descriptor.set_schedule_state(ScheduleState::Standby);
        self.standby().insert(descriptor.name.clone());
    }

    /// 为待接管的任务重试认领，返回本轮接管成功的任务名
    async fn retry_standby(&self) -> Vec<String> {
        let Some(registry) = &self.registry else {
            return Vec::new();
        };
        let mut pending: Vec<String> = self.standby().iter().cloned().collect();
        pending.sort();

        let mut taken = Vec::new();
        for name in pending {
            let Some(descriptor) = self.catalog.get(&name) else {
                self.standby().remove(&name);
                continue;
            };
            match registry.register_ownership(&descriptor).await {
                Ok(true) => {
                    self.standby().remove(&name);
                    if self.started.load(Ordering::SeqCst) && self.is_bindable(&descriptor) {
                        if let Err(e) = self.bind(&descriptor) {
                            error!("接管任务 {} 后绑定定时器失败: {}", name, e);
                            continue;
                        }
                    } else if descriptor.is_paused() {
                        descriptor.set_schedule_state(ScheduleState::Paused);
                    } else {
                        descriptor.set_schedule_state(ScheduleState::Unscheduled);
                    }
                    info!("接管任务 {}", name);
                    taken.push(name);
                }
                Ok(false) => debug!("任务 {} 仍归属其他实例", name),
                Err(e) => warn!("重试认领任务 {} 失败: {}", name, e),
            }
        }
        taken
    }
}

/// 维护循环结束后处理丢失与接管
struct TakeoverListener {
    inner: Weak<SchedulerInner>,
}

#[async_trait]
impl MaintenanceListener for TakeoverListener {
    async fn on_maintenance(&self, report: &MaintenanceReport) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        for name in &report.heartbeat.lost {
            if let Some(descriptor) = inner.catalog.get(name) {
                warn!("任务 {} 的归属已转移，本实例停止调度", name);
                inner.enter_standby(&descriptor);
            }
        }
        inner.retry_standby().await;
    }
}

/// 集群感知的周期任务调度器
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn builder(executor: Arc<TaskExecutor>) -> SchedulerBuilder {
        SchedulerBuilder::new(executor)
    }

    /// 注册任务
    ///
    /// 触发方式不合法或任务名重复时拒绝注册。启用注册表时，归属其他实例的分布式任务
    /// 进入待接管状态；调度器已启动时立即绑定定时器。
    pub async fn register(&self, descriptor: TaskDescriptor) -> SchedulerResult<()> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(SchedulerError::Internal("调度器已销毁".to_string()));
        }
        descriptor.validate()?;
        let descriptor = Arc::new(descriptor);
        self.inner.catalog.register(Arc::clone(&descriptor))?;

        if !descriptor.enabled {
            info!("任务 {} 未启用，仅登记不调度", descriptor.name);
            return Ok(());
        }

        if let Some(registry) = self.inner.registry.as_ref().filter(|_| descriptor.distributed) {
            match registry.register_ownership(&descriptor).await {
                Ok(true) => {}
                Ok(false) => {
                    info!("任务 {} 由其他实例负责，进入待接管状态", descriptor.name);
                    self.inner.enter_standby(&descriptor);
                    return Ok(());
                }
                Err(e) => {
                    warn!("认领任务 {} 失败，进入待接管状态: {}", descriptor.name, e);
                    self.inner.enter_standby(&descriptor);
                    return Ok(());
                }
            }
        }

        if self.is_started() {
            self.inner.bind(&descriptor)?;
            info!("任务 {} 已注册并开始调度", descriptor.name);
        } else {
            descriptor.set_schedule_state(ScheduleState::Unscheduled);
            info!("任务 {} 已注册，等待调度器启动", descriptor.name);
        }
        Ok(())
    }

    /// 注销任务：取消定时器、移除通道中未开始的执行并释放集群归属
    ///
    /// 正在执行的那一次不会被打断。
    pub async fn unregister(&self, name: &str) -> SchedulerResult<()> {
        let descriptor = self
            .inner
            .catalog
            .unregister(name)
            .ok_or_else(|| SchedulerError::TaskNotFound {
                name: name.to_string(),
            })?;
        self.inner
            .dispatcher
            .cancel_pending(&descriptor.group, &descriptor.name);
        self.inner.standby().remove(name);

        if let Some(registry) = &self.inner.registry {
            if let Err(e) = registry.unregister_ownership(name).await {
                warn!("释放任务 {} 的集群归属失败: {}", name, e);
            }
        }
        info!("任务 {} 已注销", name);
        Ok(())
    }

    fn require(&self, name: &str) -> SchedulerResult<Arc<TaskDescriptor>> {
        self.inner
            .catalog
            .get(name)
            .ok_or_else(|| SchedulerError::TaskNotFound {
                name: name.to_string(),
            })
    }

    /// 立即触发一次执行，仍然经过分组分发器和集群锁
    ///
    /// 任务不存在或分发器已关闭时返回 `false`。
    pub fn trigger(&self, name: &str) -> bool {
        let Some(descriptor) = self.inner.catalog.get(name) else {
            warn!("手动触发失败，任务 {} 不存在", name);
            return false;
        };
        match self.inner.dispatcher.dispatch(descriptor) {
            Ok(_) => {
                info!("手动触发任务 {}", name);
                true
            }
            Err(e) => {
                warn!("手动触发任务 {} 失败: {}", name, e);
                false
            }
        }
    }

    /// 立即触发并等待本次执行结束
    pub async fn trigger_and_wait(&self, name: &str) -> SchedulerResult<ExecutionOutcome> {
        let descriptor = self.require(name)?;
        let handle = self.inner.dispatcher.dispatch(descriptor)?;
        handle.wait().await.ok_or_else(|| {
            SchedulerError::Internal(format!("任务 {} 的执行在完成前被丢弃", name))
        })
    }

    pub fn pause(&self, name: &str) -> SchedulerResult<()> {
        let descriptor = self.require(name)?;
        descriptor.set_paused(true);
        descriptor.cancel_subscription();
        descriptor.set_schedule_state(ScheduleState::Paused);
        info!("任务 {} 已暂停", name);
        Ok(())
    }

    pub fn resume(&self, name: &str) -> SchedulerResult<()> {
        let descriptor = self.require(name)?;
        descriptor.set_paused(false);
        if self.inner.is_standby(name) {
            descriptor.set_schedule_state(ScheduleState::Standby);
        } else if self.is_started() && descriptor.enabled {
            self.inner.bind(&descriptor)?;
        } else {
            descriptor.set_schedule_state(ScheduleState::Unscheduled);
        }
        info!("任务 {} 已恢复", name);
        Ok(())
    }

    pub fn list_all(&self) -> Vec<DescriptorSnapshot> {
        self.inner
            .catalog
            .list_all()
            .iter()
            .map(|descriptor| descriptor.snapshot())
            .collect()
    }

    pub fn get_stats(&self, name: &str) -> SchedulerResult<ExecutionStats> {
        Ok(self.require(name)?.stats())
    }

    pub fn list_groups(&self) -> Vec<String> {
        self.inner.catalog.list_groups()
    }

    pub fn get(&self, name: &str) -> Option<DescriptorSnapshot> {
        self.inner.catalog.get(name).map(|d| d.snapshot())
    }

    pub fn state(&self, name: &str) -> Option<ScheduleState> {
        self.inner.catalog.get(name).map(|d| d.schedule_state())
    }

    pub fn descriptor(&self, name: &str) -> Option<Arc<TaskDescriptor>> {
        self.inner.catalog.get(name)
    }

    pub fn dispatcher(&self) -> &Arc<GroupDispatcher> {
        &self.inner.dispatcher
    }

    pub fn registry(&self) -> Option<&Arc<ClusterRegistry>> {
        self.inner.registry.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// 待接管任务名
    pub fn standby_tasks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.standby().iter().cloned().collect();
        names.sort();
        names
    }

    /// 立即为待接管任务重试一次认领
    pub async fn try_takeover(&self) -> Vec<String> {
        self.inner.retry_standby().await
    }

    /// 启动调度：为所有可调度任务绑定定时器，并启动注册表维护循环
    pub fn start(&self) -> SchedulerResult<()> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(SchedulerError::Internal("调度器已销毁，无法启动".to_string()));
        }
        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!("调度器已在运行");
            return Ok(());
        }

        let mut bound = 0usize;
        for descriptor in self.inner.catalog.list_all() {
            if !self.inner.is_bindable(&descriptor) {
                continue;
            }
            if let Err(e) = self.inner.bind(&descriptor) {
                error!("绑定任务 {} 的定时器失败: {}", descriptor.name, e);
                continue;
            }
            bound += 1;
        }

        if let Some(registry) = &self.inner.registry {
            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
            let listener = Arc::new(TakeoverListener {
                inner: Arc::downgrade(&self.inner),
            });
            let handle = RegistryMaintenance::new(Arc::clone(registry))
                .with_listener(listener)
                .start(shutdown_rx);
            *self
                .inner
                .maintenance
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(MaintenanceHandle {
                shutdown_tx,
                handle,
            });
        }

        info!(
            "调度器已启动: 绑定{}个任务, 待接管{}个",
            bound,
            self.inner.standby().len()
        );
        Ok(())
    }

    /// 停止调度：取消所有定时器订阅并等待维护循环退出，不等待正在执行的任务
    pub async fn stop(&self) {
        if !self.inner.started.swap(false, Ordering::SeqCst) {
            return;
        }
        for descriptor in self.inner.catalog.list_all() {
            if descriptor.cancel_subscription() {
                descriptor.set_schedule_state(ScheduleState::Cancelled);
            }
        }

        let maintenance = self
            .inner
            .maintenance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(maintenance) = maintenance {
            let _ = maintenance.shutdown_tx.send(());
            // 维护循环可能正持有注册表锁，等它完成当前一轮再退出
            if let Err(e) = maintenance.handle.await {
                warn!("注册表维护循环异常退出: {}", e);
            }
        }
        info!("调度器已停止");
    }

    /// 停止调度并关闭所有分组通道，释放本实例持有的集群归属
    pub async fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop().await;
        self.inner.dispatcher.shutdown().await;
        self.inner.dispatcher.executor().interrupt();

        if let Some(registry) = &self.inner.registry {
            for descriptor in self.inner.catalog.list_all() {
                if !registry.owns_locally(&descriptor.name) {
                    continue;
                }
                if let Err(e) = registry.unregister_ownership(&descriptor.name).await {
                    warn!("释放任务 {} 的集群归属失败: {}", descriptor.name, e);
                }
            }
        }
        info!("调度器已销毁");
    }
}
