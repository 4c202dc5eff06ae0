//! # 数据模型
//!
//! 调度器的核心数据结构：
//!
//! - [`TaskDescriptor`]：任务配置与运行时状态
//! - [`Trigger`]：cron / 固定频率 / 固定延迟三选一的触发方式
//! - [`ExecutionStats`]：执行统计
//! - [`DescriptorSnapshot`]：可序列化的任务快照，同时作为注册表负载
//! - [`TimerSubscription`]：定时器绑定句柄
//!
//! 所有时间字段使用 `DateTime<Utc>`。

pub mod snapshot;
pub mod stats;
pub mod subscription;
pub mod task;
pub mod trigger;

pub use snapshot::DescriptorSnapshot;
pub use stats::{DurationStats, ExecutionStats};
pub use subscription::TimerSubscription;
pub use task::{
    ScheduleState, TaskDescriptor, TaskDescriptorBuilder, TaskStatus, DEFAULT_GROUP,
    DEFAULT_LOCK_HOLD_TIME, DEFAULT_RETRY_DELAY,
};
pub use trigger::{normalize_cron, Trigger, TriggerKind};
