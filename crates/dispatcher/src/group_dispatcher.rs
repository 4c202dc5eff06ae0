//! 分组分发器
//!
//! 默认分组的执行直接提交到共享的tokio运行时，彼此没有顺序保证。
//! 其他分组各有一条串行通道，通道内按 `(order, 入队序号)` 升序逐个执行。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use scheduler_core::{config::AppConfig, errors::SchedulerError, SchedulerResult, TaskDescriptor};
use scheduler_infrastructure::MetricsCollector;
use scheduler_worker::{ExecutionOutcome, TaskExecutor};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// 通道从空闲被唤醒后，等待同一批提交全部入队的时间
    pub gather_window: Duration,
    pub lane_shutdown_timeout: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for DispatcherSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            gather_window: Duration::from_millis(config.dispatcher.gather_window_ms),
            lane_shutdown_timeout: Duration::from_secs(
                config.dispatcher.lane_shutdown_timeout_seconds,
            ),
        }
    }
}

/// 一次分发的完成通知
///
/// 任务被丢弃（分发器关闭或任务注销）时 [`wait`](Self::wait) 返回 `None`。
#[derive(Debug)]
pub struct DispatchHandle {
    rx: oneshot::Receiver<ExecutionOutcome>,
}

impl DispatchHandle {
    pub async fn wait(self) -> Option<ExecutionOutcome> {
        self.rx.await.ok()
    }
}

struct LaneItem {
    descriptor: Arc<TaskDescriptor>,
    waiters: Vec<oneshot::Sender<ExecutionOutcome>>,
}

#[derive(Default)]
struct LaneQueue {
    items: BTreeMap<(i32, u64), LaneItem>,
    /// 任务名到队列键，同名任务在队列中只保留一项
    index: HashMap<String, (i32, u64)>,
    next_seq: u64,
}

impl LaneQueue {
    fn push(&mut self, descriptor: Arc<TaskDescriptor>, waiter: oneshot::Sender<ExecutionOutcome>) {
        if let Some(key) = self.index.get(&descriptor.name) {
            if let Some(item) = self.items.get_mut(key) {
                item.waiters.push(waiter);
                return;
            }
        }
        let key = (descriptor.order, self.next_seq);
        self.next_seq += 1;
        self.index.insert(descriptor.name.clone(), key);
        self.items.insert(
            key,
            LaneItem {
                descriptor,
                waiters: vec![waiter],
            },
        );
    }

    fn pop(&mut self) -> Option<LaneItem> {
        let (_, item) = self.items.pop_first()?;
        self.index.remove(&item.descriptor.name);
        Some(item)
    }

    fn remove(&mut self, task_name: &str) -> bool {
        match self.index.remove(task_name) {
            Some(key) => self.items.remove(&key).is_some(),
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

struct GroupLane {
    group: String,
    queue: Mutex<LaneQueue>,
    notify: Notify,
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl GroupLane {
    fn queue(&self) -> MutexGuard<'_, LaneQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_worker(
        self: &Arc<Self>,
        executor: Arc<TaskExecutor>,
        metrics: MetricsCollector,
        gather_window: Duration,
    ) {
        let lane = Arc::clone(self);
        let handle = tokio::spawn(async move {
            debug!("分组 {} 的执行通道已启动", lane.group);
            // 通道随第一次提交创建，同样先等待同一批提交入队
            if !gather_window.is_zero() {
                tokio::time::sleep(gather_window).await;
            }
            loop {
                let next = {
                    let mut queue = lane.queue();
                    let item = queue.pop();
                    metrics.update_lane_depth(&lane.group, queue.len());
                    item
                };

                let item = match next {
                    Some(item) => item,
                    None => {
                        if lane.closed.load(Ordering::SeqCst) {
                            break;
                        }
                        lane.notify.notified().await;
                        if !gather_window.is_zero() {
                            tokio::time::sleep(gather_window).await;
                        }
                        continue;
                    }
                };

                if lane.closed.load(Ordering::SeqCst) {
                    break;
                }
                let outcome = executor.execute(&item.descriptor).await;
                for waiter in item.waiters {
                    let _ = waiter.send(outcome);
                }
            }
            debug!("分组 {} 的执行通道已退出", lane.group);
        });
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }
}

pub struct GroupDispatcher {
    executor: Arc<TaskExecutor>,
    settings: DispatcherSettings,
    metrics: MetricsCollector,
    lanes: Mutex<HashMap<String, Arc<GroupLane>>>,
    shut_down: AtomicBool,
}

impl GroupDispatcher {
    pub fn new(executor: Arc<TaskExecutor>, settings: DispatcherSettings) -> Self {
        Self {
            executor,
            settings,
            metrics: MetricsCollector::new(),
            lanes: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn executor(&self) -> &Arc<TaskExecutor> {
        &self.executor
    }

    fn lanes(&self) -> MutexGuard<'_, HashMap<String, Arc<GroupLane>>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lane_for(&self, group: &str) -> Arc<GroupLane> {
        let mut lanes = self.lanes();
        if let Some(lane) = lanes.get(group) {
            return Arc::clone(lane);
        }
        let lane = Arc::new(GroupLane {
            group: group.to_string(),
            queue: Mutex::new(LaneQueue::default()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            worker: Mutex::new(None),
        });
        lane.spawn_worker(
            Arc::clone(&self.executor),
            self.metrics.clone(),
            self.settings.gather_window,
        );
        lanes.insert(group.to_string(), Arc::clone(&lane));
        info!("创建分组 {} 的执行通道", group);
        lane
    }

    /// 分发一次执行
    pub fn dispatch(&self, descriptor: Arc<TaskDescriptor>) -> SchedulerResult<DispatchHandle> {
        if self.is_shut_down() {
            return Err(SchedulerError::Internal(format!(
                "分发器已关闭，拒绝任务 {}",
                descriptor.name
            )));
        }

        let (tx, rx) = oneshot::channel();
        if descriptor.is_default_group() {
            let executor = Arc::clone(&self.executor);
            tokio::spawn(async move {
                let outcome = executor.execute(&descriptor).await;
                let _ = tx.send(outcome);
            });
        } else {
            let lane = self.lane_for(&descriptor.group);
            {
                let mut queue = lane.queue();
                queue.push(descriptor, tx);
                self.metrics.update_lane_depth(&lane.group, queue.len());
            }
            lane.notify.notify_one();
        }
        Ok(DispatchHandle { rx })
    }

    /// 移除通道中尚未开始的同名任务
    pub fn cancel_pending(&self, group: &str, task_name: &str) -> bool {
        let lane = self.lanes().get(group).cloned();
        match lane {
            Some(lane) => lane.queue().remove(task_name),
            None => false,
        }
    }

    pub fn queue_depth(&self, group: &str) -> usize {
        self.lanes()
            .get(group)
            .map(|lane| lane.queue().len())
            .unwrap_or(0)
    }

    pub fn lane_groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = self.lanes().keys().cloned().collect();
        groups.sort();
        groups
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// 关闭所有通道：丢弃排队中的任务，等待正在执行的任务结束，超时后放弃等待
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let lanes: Vec<Arc<GroupLane>> = self.lanes().drain().map(|(_, lane)| lane).collect();
        for lane in lanes {
            lane.closed.store(true, Ordering::SeqCst);
            let dropped = {
                let mut queue = lane.queue();
                let dropped = queue.len();
                *queue = LaneQueue::default();
                dropped
            };
            if dropped > 0 {
                info!("分组 {} 关闭，丢弃{}个排队任务", lane.group, dropped);
            }
            lane.notify.notify_one();

            let worker = lane
                .worker
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(mut worker) = worker {
                if tokio::time::timeout(self.settings.lane_shutdown_timeout, &mut worker)
                    .await
                    .is_err()
                {
                    warn!("分组 {} 的执行通道未在超时内结束，强制终止", lane.group);
                    worker.abort();
                    // 等待被中止的执行清理完运行状态和集群锁
                    let _ = worker.await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, order: i32) -> Arc<TaskDescriptor> {
        Arc::new(
            TaskDescriptor::builder(name, scheduler_core::task_fn(|| async { Ok(()) }))
                .group("g")
                .order(order)
                .fixed_delay(Duration::from_secs(1))
                .build(),
        )
    }

    #[test]
    fn test_lane_queue_orders_by_order_then_sequence() {
        let mut queue = LaneQueue::default();
        for (name, order) in [("c", 2), ("b", 1), ("a2", 0), ("a1", 0)] {
            let (tx, _rx) = oneshot::channel();
            queue.push(descriptor(name, order), tx);
        }

        let drained: Vec<String> = std::iter::from_fn(|| queue.pop())
            .map(|item| item.descriptor.name.clone())
            .collect();
        assert_eq!(drained, vec!["a2", "a1", "b", "c"]);
    }

    #[test]
    fn test_lane_queue_coalesces_same_task() {
        let mut queue = LaneQueue::default();
        let task = descriptor("a", 0);
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        queue.push(Arc::clone(&task), tx1);
        queue.push(task, tx2);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().waiters.len(), 2);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_lane_queue_remove() {
        let mut queue = LaneQueue::default();
        let (tx, _rx) = oneshot::channel();
        queue.push(descriptor("a", 0), tx);
        assert!(queue.remove("a"));
        assert!(!queue.remove("a"));
        assert_eq!(queue.len(), 0);
    }
}
