use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DescriptorSnapshot, DurationStats, ExecutionStats, TimerSubscription, Trigger};
use crate::errors::{SchedulerError, SchedulerResult};
use crate::traits::TaskHandler;

pub const DEFAULT_GROUP: &str = "default";
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(5000);
pub const DEFAULT_LOCK_HOLD_TIME: Duration = Duration::from_secs(300);

/// 定时器绑定状态
///
/// `UNSCHEDULED → SCHEDULED → SCHEDULED | CANCELLED`，执行中的 RUNNING 由
/// [`TaskDescriptor::is_running`] 单独表示。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleState {
    Unscheduled,
    Scheduled,
    /// 任务归属其他实例，本实例等待接管
    Standby,
    Paused,
    Cancelled,
}

/// 对外展示的任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Disabled,
    Paused,
    Running,
    Error,
    Cancelled,
    Standby,
    Idle,
}

#[derive(Debug, Clone)]
struct TaskRuntime {
    last_execution_time: Option<DateTime<Utc>>,
    next_execution_time: Option<DateTime<Utc>>,
    execution_count: u64,
    error_count: u64,
    failed_attempts: u64,
    retry_count: u64,
    last_error: Option<String>,
    durations: DurationStats,
    owner_instance: Option<String>,
    last_heartbeat: Option<DateTime<Utc>>,
    schedule_state: ScheduleState,
}

impl Default for TaskRuntime {
    fn default() -> Self {
        Self {
            last_execution_time: None,
            next_execution_time: None,
            execution_count: 0,
            error_count: 0,
            failed_attempts: 0,
            retry_count: 0,
            last_error: None,
            durations: DurationStats::default(),
            owner_instance: None,
            last_heartbeat: None,
            schedule_state: ScheduleState::Unscheduled,
        }
    }
}

/// 任务描述
///
/// 一个可调度单元的配置（创建后不可变）与运行时状态（仅由调度器和执行器修改）。
/// 配置字段公开只读，运行时状态通过方法访问。
pub struct TaskDescriptor {
    pub name: String,
    pub group: String,
    pub cron: Option<String>,
    pub fixed_rate: Option<Duration>,
    pub fixed_delay: Option<Duration>,
    pub initial_delay: Duration,
    /// 组内执行顺序，值越小越先执行
    pub order: i32,
    /// 默认分组下为true时不等待执行结束
    pub is_async: bool,
    pub enabled: bool,
    pub description: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// 仅用于监控告警，不会中断执行
    pub timeout: Option<Duration>,
    /// 是否需要集群锁
    pub distributed: bool,
    /// 执行锁的租约时长
    pub lock_hold_time: Duration,
    handler: Arc<dyn TaskHandler>,
    running: AtomicBool,
    paused: AtomicBool,
    retired: AtomicBool,
    runtime: RwLock<TaskRuntime>,
    subscription: Mutex<Option<TimerSubscription>>,
}

impl TaskDescriptor {
    pub fn builder(name: impl Into<String>, handler: Arc<dyn TaskHandler>) -> TaskDescriptorBuilder {
        TaskDescriptorBuilder::new(name, handler)
    }

    /// 校验描述并返回唯一的触发方式
    pub fn validate(&self) -> SchedulerResult<Trigger> {
        if self.name.trim().is_empty() {
            return Err(SchedulerError::InvalidDescriptor(
                "任务名称不能为空".to_string(),
            ));
        }
        if self.group.trim().is_empty() {
            return Err(SchedulerError::InvalidDescriptor(format!(
                "任务 {} 的分组不能为空",
                self.name
            )));
        }
        Trigger::resolve(
            &self.name,
            self.cron.as_deref(),
            self.fixed_rate,
            self.fixed_delay,
        )
    }

    pub fn is_default_group(&self) -> bool {
        self.group == DEFAULT_GROUP
    }

    pub fn handler(&self) -> Arc<dyn TaskHandler> {
        Arc::clone(&self.handler)
    }

    fn runtime(&self) -> RwLockReadGuard<'_, TaskRuntime> {
        self.runtime.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn runtime_mut(&self) -> RwLockWriteGuard<'_, TaskRuntime> {
        self.runtime.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// 任务已注销，之后不再开始新的执行
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
        self.cancel_subscription();
        self.set_schedule_state(ScheduleState::Cancelled);
    }

    pub fn mark_started(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.runtime_mut().last_execution_time = Some(Utc::now());
    }

    /// 记录一次成功执行
    pub fn mark_completed(&self, duration_ms: u64) {
        let mut runtime = self.runtime_mut();
        runtime.execution_count += 1;
        runtime.last_error = None;
        runtime.last_execution_time = Some(Utc::now());
        let count = runtime.execution_count;
        runtime.durations.record(duration_ms, count);
        drop(runtime);
        self.running.store(false, Ordering::SeqCst);
    }

    /// 记录一次失败的尝试
    pub fn mark_attempt_failed(&self, error: impl Into<String>) {
        let mut runtime = self.runtime_mut();
        runtime.failed_attempts += 1;
        runtime.last_error = Some(error.into());
    }

    pub fn mark_retry(&self) {
        self.runtime_mut().retry_count += 1;
    }

    /// 本次触发以失败告终
    pub fn mark_failed(&self) {
        self.runtime_mut().error_count += 1;
        self.running.store(false, Ordering::SeqCst);
    }

    /// 被中断等情况下结束本次执行，不计入成功或失败
    pub fn mark_finished(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn set_next_execution_time(&self, next: Option<DateTime<Utc>>) {
        self.runtime_mut().next_execution_time = next;
    }

    pub fn next_execution_time(&self) -> Option<DateTime<Utc>> {
        self.runtime().next_execution_time
    }

    pub fn last_execution_time(&self) -> Option<DateTime<Utc>> {
        self.runtime().last_execution_time
    }

    pub fn schedule_state(&self) -> ScheduleState {
        self.runtime().schedule_state
    }

    pub fn set_schedule_state(&self, state: ScheduleState) {
        self.runtime_mut().schedule_state = state;
    }

    pub fn set_owner(&self, instance_id: &str, heartbeat: DateTime<Utc>) {
        let mut runtime = self.runtime_mut();
        runtime.owner_instance = Some(instance_id.to_string());
        runtime.last_heartbeat = Some(heartbeat);
    }

    pub fn clear_owner(&self) {
        let mut runtime = self.runtime_mut();
        runtime.owner_instance = None;
        runtime.last_heartbeat = None;
    }

    pub fn owner_instance(&self) -> Option<String> {
        self.runtime().owner_instance.clone()
    }

    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.runtime().last_heartbeat
    }

    /// 绑定新的定时器订阅，旧订阅会被取消
    pub fn install_subscription(&self, subscription: TimerSubscription) {
        let mut slot = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(subscription) {
            previous.cancel();
        }
    }

    /// 取消活跃的定时器订阅，返回之前是否存在订阅
    pub fn cancel_subscription(&self) -> bool {
        let previous = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match previous {
            Some(subscription) => {
                subscription.cancel();
                true
            }
            None => false,
        }
    }

    pub fn has_subscription(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| !s.is_finished())
    }

    pub fn status(&self) -> TaskStatus {
        let runtime = self.runtime();
        if !self.enabled {
            TaskStatus::Disabled
        } else if self.is_paused() {
            TaskStatus::Paused
        } else if self.is_running() {
            TaskStatus::Running
        } else if runtime.last_error.is_some() {
            TaskStatus::Error
        } else if runtime.schedule_state == ScheduleState::Cancelled {
            TaskStatus::Cancelled
        } else if runtime.schedule_state == ScheduleState::Standby {
            TaskStatus::Standby
        } else {
            TaskStatus::Idle
        }
    }

    pub fn stats(&self) -> ExecutionStats {
        let runtime = self.runtime();
        ExecutionStats {
            execution_count: runtime.execution_count,
            error_count: runtime.error_count,
            failed_attempts: runtime.failed_attempts,
            retry_count: runtime.retry_count,
            last_error: runtime.last_error.clone(),
            last_execution_time: runtime.last_execution_time,
            next_execution_time: runtime.next_execution_time,
            last_duration_ms: runtime.durations.last_ms,
            min_duration_ms: runtime.durations.min(),
            max_duration_ms: runtime.durations.max_ms,
            total_duration_ms: runtime.durations.total_ms,
            average_duration_ms: runtime.durations.average_ms,
        }
    }

    pub fn snapshot(&self) -> DescriptorSnapshot {
        let trigger = match self.validate() {
            Ok(trigger) => trigger.to_string(),
            Err(_) => "invalid".to_string(),
        };
        let (owner_instance, last_heartbeat, schedule_state) = {
            let runtime = self.runtime();
            (
                runtime.owner_instance.clone(),
                runtime.last_heartbeat,
                runtime.schedule_state,
            )
        };

        DescriptorSnapshot {
            name: self.name.clone(),
            group: self.group.clone(),
            trigger,
            cron: self.cron.clone(),
            fixed_rate_ms: self.fixed_rate.map(|d| d.as_millis() as u64),
            fixed_delay_ms: self.fixed_delay.map(|d| d.as_millis() as u64),
            initial_delay_ms: self.initial_delay.as_millis() as u64,
            order: self.order,
            is_async: self.is_async,
            enabled: self.enabled,
            description: self.description.clone(),
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay.as_millis() as u64,
            timeout_ms: self.timeout.map(|d| d.as_millis() as u64),
            distributed: self.distributed,
            running: self.is_running(),
            paused: self.is_paused(),
            status: self.status(),
            schedule_state,
            stats: self.stats(),
            owner_instance,
            last_heartbeat,
        }
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("cron", &self.cron)
            .field("fixed_rate", &self.fixed_rate)
            .field("fixed_delay", &self.fixed_delay)
            .field("order", &self.order)
            .field("is_async", &self.is_async)
            .field("enabled", &self.enabled)
            .field("distributed", &self.distributed)
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .finish_non_exhaustive()
    }
}

/// [`TaskDescriptor`] 的构建器，由外部的任务来源（配置、代码注册等）使用
pub struct TaskDescriptorBuilder {
    name: String,
    group: String,
    cron: Option<String>,
    fixed_rate: Option<Duration>,
    fixed_delay: Option<Duration>,
    initial_delay: Duration,
    order: i32,
    is_async: bool,
    enabled: bool,
    description: String,
    max_retries: u32,
    retry_delay: Duration,
    timeout: Option<Duration>,
    distributed: bool,
    lock_hold_time: Duration,
    handler: Arc<dyn TaskHandler>,
}

impl TaskDescriptorBuilder {
    pub fn new(name: impl Into<String>, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            name: name.into(),
            group: DEFAULT_GROUP.to_string(),
            cron: None,
            fixed_rate: None,
            fixed_delay: None,
            initial_delay: Duration::ZERO,
            order: 0,
            is_async: false,
            enabled: true,
            description: String::new(),
            max_retries: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: None,
            distributed: true,
            lock_hold_time: DEFAULT_LOCK_HOLD_TIME,
            handler,
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        let group = group.into();
        self.group = if group.trim().is_empty() {
            DEFAULT_GROUP.to_string()
        } else {
            group
        };
        self
    }

    pub fn cron(mut self, expr: impl Into<String>) -> Self {
        self.cron = Some(expr.into());
        self
    }

    pub fn fixed_rate(mut self, rate: Duration) -> Self {
        self.fixed_rate = Some(rate);
        self
    }

    pub fn fixed_delay(mut self, delay: Duration) -> Self {
        self.fixed_delay = Some(delay);
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn async_mode(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn distributed(mut self, distributed: bool) -> Self {
        self.distributed = distributed;
        self
    }

    pub fn lock_hold_time(mut self, lease: Duration) -> Self {
        self.lock_hold_time = lease;
        self
    }

    pub fn build(self) -> TaskDescriptor {
        TaskDescriptor {
            name: self.name,
            group: self.group,
            cron: self.cron,
            fixed_rate: self.fixed_rate,
            fixed_delay: self.fixed_delay,
            initial_delay: self.initial_delay,
            order: self.order,
            is_async: self.is_async,
            enabled: self.enabled,
            description: self.description,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
            timeout: self.timeout,
            distributed: self.distributed,
            lock_hold_time: self.lock_hold_time,
            handler: self.handler,
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            retired: AtomicBool::new(false),
            runtime: RwLock::new(TaskRuntime::default()),
            subscription: Mutex::new(None),
        }
    }
}
