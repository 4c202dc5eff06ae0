//! 常用的任务描述构造函数

use std::sync::Arc;
use std::time::Duration;

use scheduler_core::{traits::TaskHandler, TaskDescriptor, TaskDescriptorBuilder};

/// 只能通过手动触发执行的cron：每年1月1日零点
pub const MANUAL_CRON: &str = "0 0 0 1 1 *";

/// 默认分组、固定频率、立即重试的任务
pub fn fixed_rate_task(name: &str, rate: Duration, handler: Arc<dyn TaskHandler>) -> TaskDescriptorBuilder {
    TaskDescriptor::builder(name, handler)
        .fixed_rate(rate)
        .retry_delay(Duration::from_millis(10))
}

pub fn fixed_delay_task(name: &str, delay: Duration, handler: Arc<dyn TaskHandler>) -> TaskDescriptorBuilder {
    TaskDescriptor::builder(name, handler)
        .fixed_delay(delay)
        .retry_delay(Duration::from_millis(10))
}

/// 不会被定时器自然触发的任务，配合 `trigger` 使用
pub fn manual_task(name: &str, handler: Arc<dyn TaskHandler>) -> TaskDescriptorBuilder {
    TaskDescriptor::builder(name, handler)
        .cron(MANUAL_CRON)
        .retry_delay(Duration::from_millis(10))
}

/// 分组内的手动任务
pub fn grouped_task(
    name: &str,
    group: &str,
    order: i32,
    handler: Arc<dyn TaskHandler>,
) -> TaskDescriptorBuilder {
    manual_task(name, handler).group(group).order(order)
}
