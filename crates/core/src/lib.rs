//! # 调度器核心库
//!
//! 集群感知的周期任务调度器的基础模块：
//!
//! - [`errors`]：统一错误类型 [`SchedulerError`]
//! - [`config`]：配置加载与校验
//! - [`models`]：任务描述、触发方式、执行统计
//! - [`traits`]：锁服务、注册表存储、任务体等抽象接口
//! - [`keys`]：共享存储中的键布局
//! - [`logging`]：日志初始化

pub mod config;
pub mod errors;
pub mod keys;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::{SchedulerError, SchedulerResult};
pub use keys::KeySpace;
pub use logging::init_logging;
pub use models::{
    DescriptorSnapshot, ExecutionStats, ScheduleState, TaskDescriptor, TaskDescriptorBuilder,
    TaskStatus, Trigger, DEFAULT_GROUP,
};
pub use traits::{task_fn, LockService, RegistryStore, TaskHandler};
