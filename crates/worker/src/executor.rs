//! 任务执行器
//!
//! 一次触发的完整执行流程：本地去重、集群锁、调用任务体、统计、重试、释放锁。

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use scheduler_core::{keys::KeySpace, traits::LockService, TaskDescriptor};
use scheduler_infrastructure::MetricsCollector;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// 跳过本次触发的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 本进程内已有同名任务在执行
    AlreadyRunning,
    /// 集群锁被其他实例或其他执行持有
    LockBusy,
    /// 获取锁时后端出错
    LockUnavailable,
    /// 任务已注销
    Retired,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyRunning => "running",
            SkipReason::LockBusy => "lock_busy",
            SkipReason::LockUnavailable => "lock_unavailable",
            SkipReason::Retired => "retired",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次触发的执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Skipped(SkipReason),
    Succeeded { attempts: u32 },
    Failed { attempts: u32 },
    /// 重试等待期间收到关闭信号
    Interrupted,
}

impl ExecutionOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, ExecutionOutcome::Skipped(_))
    }

    /// 任务体是否至少被调用过一次
    pub fn ran(&self) -> bool {
        !self.is_skipped()
    }
}

/// 本地运行标记，离开作用域时自动清除
struct RunningGuard {
    running: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

/// 一次执行的作用域：无论正常结束还是被中途丢弃，都清除运行状态并释放集群锁
struct ExecutionScope<'a> {
    descriptor: &'a TaskDescriptor,
    lock: Option<(Arc<dyn LockService>, String)>,
}

impl<'a> ExecutionScope<'a> {
    fn new(descriptor: &'a TaskDescriptor) -> Self {
        Self {
            descriptor,
            lock: None,
        }
    }

    fn hold_lock(&mut self, lock: Arc<dyn LockService>, key: String) {
        self.lock = Some((lock, key));
    }

    /// 正常结束时在当前任务内释放锁
    async fn release(mut self) {
        if let Some((lock, key)) = self.lock.take() {
            if let Err(e) = lock.unlock(&key).await {
                error!("释放任务 {} 的集群锁失败: {}", self.descriptor.name, e);
            }
        }
    }
}

impl Drop for ExecutionScope<'_> {
    fn drop(&mut self) {
        self.descriptor.mark_finished();
        let Some((lock, key)) = self.lock.take() else {
            return;
        };
        // 执行被中途丢弃，锁只能交给运行时异步释放
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let name = self.descriptor.name.clone();
                warn!("任务 {} 的执行被中止，异步释放集群锁", name);
                runtime.spawn(async move {
                    if let Err(e) = lock.unlock(&key).await {
                        error!("释放任务 {} 的集群锁失败: {}", name, e);
                    }
                });
            }
            Err(_) => warn!(
                "任务 {} 的执行被中止且运行时已关闭，集群锁将在租约到期后失效",
                self.descriptor.name
            ),
        }
    }
}

pub struct TaskExecutor {
    lock: Arc<dyn LockService>,
    keys: KeySpace,
    metrics: MetricsCollector,
    running: Arc<Mutex<HashSet<String>>>,
    interrupted: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl TaskExecutor {
    pub fn new(lock: Arc<dyn LockService>, keys: KeySpace) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            lock,
            keys,
            metrics: MetricsCollector::new(),
            running: Arc::new(Mutex::new(HashSet::new())),
            interrupted: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn is_running(&self, task_name: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(task_name)
    }

    pub fn running_tasks(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// 中断所有处于重试等待中的执行，之后不再开始新的执行
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn try_mark_running(&self, task_name: &str) -> Option<RunningGuard> {
        let inserted = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_name.to_string());
        inserted.then(|| RunningGuard {
            running: Arc::clone(&self.running),
            name: task_name.to_string(),
        })
    }

    /// 延迟执行形式，供定时器和分发器持有
    pub fn create_runnable(
        self: &Arc<Self>,
        descriptor: Arc<TaskDescriptor>,
    ) -> BoxFuture<'static, ExecutionOutcome> {
        let executor = Arc::clone(self);
        async move { executor.execute(&descriptor).await }.boxed()
    }

    /// 执行一次触发
    pub async fn execute(&self, descriptor: &TaskDescriptor) -> ExecutionOutcome {
        let name = descriptor.name.as_str();

        if descriptor.is_retired() {
            trace!("任务 {} 已注销，跳过执行", name);
            return self.skip(SkipReason::Retired);
        }
        if self.is_interrupted() {
            return ExecutionOutcome::Interrupted;
        }

        let Some(_guard) = self.try_mark_running(name) else {
            debug!("任务 {} 正在本地执行，跳过本次触发", name);
            return self.skip(SkipReason::AlreadyRunning);
        };

        let mut scope = ExecutionScope::new(descriptor);
        if descriptor.distributed {
            let lock_key = self.keys.task_lock(name);
            match self
                .lock
                .try_lock(&lock_key, Duration::ZERO, descriptor.lock_hold_time)
                .await
            {
                Ok(true) => scope.hold_lock(Arc::clone(&self.lock), lock_key),
                Ok(false) => {
                    trace!("任务 {} 的集群锁被占用，跳过本次触发", name);
                    return self.skip(SkipReason::LockBusy);
                }
                Err(e) => {
                    warn!("获取任务 {} 的集群锁失败: {}", name, e);
                    return self.skip(SkipReason::LockUnavailable);
                }
            }
        }

        let outcome = self.run_attempts(descriptor).await;
        scope.release().await;
        outcome
    }

    fn skip(&self, reason: SkipReason) -> ExecutionOutcome {
        self.metrics.record_task_skip(reason.as_str());
        ExecutionOutcome::Skipped(reason)
    }

    async fn run_attempts(&self, descriptor: &TaskDescriptor) -> ExecutionOutcome {
        let name = descriptor.name.as_str();
        let handler = descriptor.handler();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let max_attempts = descriptor.max_retries.saturating_add(1);

        descriptor.mark_started();

        for attempt in 1..=max_attempts {
            let started = Instant::now();
            let result = AssertUnwindSafe(handler.run()).catch_unwind().await;
            let elapsed = started.elapsed();
            self.check_timeout(descriptor, elapsed);

            let error_message = match result {
                Ok(Ok(())) => {
                    let duration_ms = elapsed.as_millis() as u64;
                    descriptor.mark_completed(duration_ms);
                    self.metrics
                        .record_task_execution(name, elapsed.as_secs_f64());
                    debug!("任务 {} 执行成功，第{}次尝试，耗时{}ms", name, attempt, duration_ms);
                    return ExecutionOutcome::Succeeded { attempts: attempt };
                }
                Ok(Err(e)) => format!("{e:#}"),
                Err(panic) => format!("任务体panic: {}", panic_message(panic.as_ref())),
            };

            descriptor.mark_attempt_failed(error_message.clone());

            if attempt == max_attempts {
                descriptor.mark_failed();
                self.metrics.record_task_failure(name);
                warn!(
                    "任务 {} 执行失败，已用尽{}次尝试: {}",
                    name, max_attempts, error_message
                );
                return ExecutionOutcome::Failed { attempts: attempt };
            }

            debug!(
                "任务 {} 第{}次尝试失败，{}ms后重试: {}",
                name,
                attempt,
                descriptor.retry_delay.as_millis(),
                error_message
            );
            descriptor.mark_retry();
            self.metrics.record_task_retry();

            if self.is_interrupted() {
                descriptor.mark_finished();
                return ExecutionOutcome::Interrupted;
            }
            tokio::select! {
                _ = tokio::time::sleep(descriptor.retry_delay) => {}
                _ = shutdown_rx.recv() => {
                    info!("任务 {} 的重试等待被中断", name);
                    descriptor.mark_finished();
                    return ExecutionOutcome::Interrupted;
                }
            }
        }

        descriptor.mark_finished();
        ExecutionOutcome::Failed { attempts: max_attempts }
    }

    fn check_timeout(&self, descriptor: &TaskDescriptor, elapsed: Duration) {
        if let Some(timeout) = descriptor.timeout {
            if elapsed > timeout {
                warn!(
                    "任务 {} 执行耗时{}ms，超过超时阈值{}ms",
                    descriptor.name,
                    elapsed.as_millis(),
                    timeout.as_millis()
                );
                self.metrics.record_task_timeout();
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "未知panic".to_string()
    }
}
