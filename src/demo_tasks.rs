//! 内置示例任务
//!
//! 覆盖几种典型用法：默认分组的异步任务、按顺序执行的分组任务、
//! 固定延迟任务以及会重试的任务。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use scheduler_core::{task_fn, AppConfig, SchedulerResult, TaskDescriptor, TaskHandler};
use scheduler_dispatcher::Scheduler;
use tracing::info;

pub const ORDER_GROUP: &str = "orderGroup1";

/// 分组内的一个步骤，记录自己被执行的次数
struct PipelineStep {
    step: &'static str,
    runs: AtomicU64,
}

#[async_trait]
impl TaskHandler for PipelineStep {
    async fn run(&self) -> Result<()> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        info!("订单流水线步骤 {} 第{}次执行", self.step, run);
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }
}

/// 随机失败的同步任务，用于演示重试
struct FlakySync {
    failure_rate: f64,
}

#[async_trait]
impl TaskHandler for FlakySync {
    async fn run(&self) -> Result<()> {
        let failed = rand::rng().random_bool(self.failure_rate);
        if failed {
            anyhow::bail!("远端同步暂时不可用");
        }
        info!("远端同步完成");
        Ok(())
    }
}

/// 构造全部示例任务
pub fn demo_descriptors(config: &AppConfig) -> Vec<TaskDescriptor> {
    let lease = Duration::from_secs(config.executor.default_lock_hold_seconds);

    let mut descriptors = vec![TaskDescriptor::builder(
        "cluster-report",
        task_fn(|| async {
            info!("集群巡检：一切正常");
            Ok(())
        }),
    )
    .fixed_rate(Duration::from_secs(10))
    .async_mode(true)
    .description("默认分组的异步巡检任务")
    .lock_hold_time(lease)
    .build()];

    for (order, step) in ["order-extract", "order-transform", "order-load"]
        .into_iter()
        .enumerate()
    {
        descriptors.push(
            TaskDescriptor::builder(
                step,
                Arc::new(PipelineStep {
                    step,
                    runs: AtomicU64::new(0),
                }),
            )
            .group(ORDER_GROUP)
            .order(order as i32)
            .cron("0 * * * * *")
            .description("同一分钟触发，按order依次执行")
            .lock_hold_time(lease)
            .build(),
        );
    }

    descriptors.push(
        TaskDescriptor::builder(
            "cache-refresh",
            task_fn(|| async {
                let millis = rand::rng().random_range(500..2000);
                tokio::time::sleep(Duration::from_millis(millis)).await;
                info!("缓存刷新完成，耗时{}ms", millis);
                Ok(())
            }),
        )
        .fixed_delay(Duration::from_secs(15))
        .initial_delay(Duration::from_secs(5))
        .description("上一次完成15秒后再次执行")
        .lock_hold_time(lease)
        .build(),
    );

    descriptors.push(
        TaskDescriptor::builder("flaky-sync", Arc::new(FlakySync { failure_rate: 0.5 }))
            .fixed_rate(Duration::from_secs(30))
            .max_retries(3)
            .retry_delay(Duration::from_secs(2))
            .timeout(Duration::from_secs(5))
            .description("随机失败，最多重试3次")
            .lock_hold_time(lease)
            .build(),
    );

    descriptors
}

pub async fn register_demo_tasks(scheduler: &Scheduler, config: &AppConfig) -> SchedulerResult<usize> {
    let descriptors = demo_descriptors(config);
    let count = descriptors.len();
    for descriptor in descriptors {
        scheduler.register(descriptor).await?;
    }
    info!("已注册{}个示例任务", count);
    Ok(count)
}
