use std::time::Duration;

use async_trait::async_trait;

use crate::SchedulerResult;

/// 集群互斥锁
///
/// 锁以调用方持有的令牌标识归属，只有持有者才能释放。
/// 租约到期后锁自动失效，长时间运行的任务可能在执行中失去锁。
#[async_trait]
pub trait LockService: Send + Sync {
    /// 在 `wait` 时间内尝试获取锁，成功后持有 `lease` 时长
    ///
    /// `wait` 为零时只尝试一次。
    async fn try_lock(&self, key: &str, wait: Duration, lease: Duration) -> SchedulerResult<bool>;

    /// 释放由本调用方持有的锁，未持有时不做任何操作
    async fn unlock(&self, key: &str) -> SchedulerResult<()>;

    async fn is_held_by_caller(&self, key: &str) -> SchedulerResult<bool>;
}
