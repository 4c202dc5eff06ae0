//! 调度器指标采集
//!
//! 通过 `metrics` 门面上报，未安装导出器时所有调用都是空操作。

use metrics::{counter, gauge, histogram, Counter};

/// 调度器指标
#[derive(Clone)]
pub struct MetricsCollector {
    task_executions_total: Counter,
    task_failures_total: Counter,
    task_retries_total: Counter,
    task_timeouts_total: Counter,
    registry_reclaimed_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            task_executions_total: counter!("scheduler_task_executions_total"),
            task_failures_total: counter!("scheduler_task_failures_total"),
            task_retries_total: counter!("scheduler_task_retries_total"),
            task_timeouts_total: counter!("scheduler_task_timeouts_total"),
            registry_reclaimed_total: counter!("scheduler_registry_reclaimed_total"),
        }
    }

    /// 记录一次成功执行
    pub fn record_task_execution(&self, task_name: &str, duration_seconds: f64) {
        self.task_executions_total.increment(1);
        histogram!(
            "scheduler_task_execution_duration_seconds",
            "task" => task_name.to_string()
        )
        .record(duration_seconds);
    }

    /// 记录一次以失败告终的触发
    pub fn record_task_failure(&self, task_name: &str) {
        self.task_failures_total.increment(1);
        counter!("scheduler_task_failures_by_task_total", "task" => task_name.to_string())
            .increment(1);
    }

    pub fn record_task_retry(&self) {
        self.task_retries_total.increment(1);
    }

    pub fn record_task_timeout(&self) {
        self.task_timeouts_total.increment(1);
    }

    /// 记录一次被跳过的触发，`reason` 取值如 `running`、`lock_busy`
    pub fn record_task_skip(&self, reason: &'static str) {
        counter!("scheduler_task_skips_total", "reason" => reason).increment(1);
    }

    pub fn update_lane_depth(&self, group: &str, depth: usize) {
        gauge!("scheduler_lane_queue_depth", "group" => group.to_string()).set(depth as f64);
    }

    pub fn record_registry_reclaimed(&self, count: u64) {
        self.registry_reclaimed_total.increment(count);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
