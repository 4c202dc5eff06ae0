use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::SchedulerResult;

/// 集群注册表的共享存储
///
/// 保存三类数据：任务快照（带TTL）、任务心跳时间戳（带TTL）、
/// 以及任务名到归属实例的映射。
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn put_snapshot(&self, task_name: &str, payload: &str, ttl: Duration)
        -> SchedulerResult<()>;

    async fn get_snapshot(&self, task_name: &str) -> SchedulerResult<Option<String>>;

    async fn delete_snapshot(&self, task_name: &str) -> SchedulerResult<()>;

    /// 心跳时间为 Unix 毫秒
    async fn put_heartbeat(&self, task_name: &str, epoch_ms: i64, ttl: Duration)
        -> SchedulerResult<()>;

    async fn get_heartbeat(&self, task_name: &str) -> SchedulerResult<Option<i64>>;

    async fn delete_heartbeat(&self, task_name: &str) -> SchedulerResult<()>;

    async fn get_owner(&self, task_name: &str) -> SchedulerResult<Option<String>>;

    async fn set_owner(&self, task_name: &str, instance_id: &str) -> SchedulerResult<()>;

    async fn remove_owner(&self, task_name: &str) -> SchedulerResult<()>;

    /// 全部任务名到归属实例的映射
    async fn owners(&self) -> SchedulerResult<HashMap<String, String>>;
}
