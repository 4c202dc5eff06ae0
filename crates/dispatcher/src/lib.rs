//! # 调度与分发
//!
//! - [`Scheduler`]：任务注册、定时器绑定与生命周期
//! - [`GroupDispatcher`]：默认分组直接执行，其他分组按 `(order, 入队顺序)` 串行执行
//! - [`TaskCatalog`]：本地任务目录
//! - [`CronScheduler`]：cron表达式解析与下次触发时间计算

pub mod catalog;
pub mod cron_utils;
pub mod group_dispatcher;
pub mod scheduler;
pub mod timer;

pub use catalog::TaskCatalog;
pub use cron_utils::CronScheduler;
pub use group_dispatcher::{DispatchHandle, DispatcherSettings, GroupDispatcher};
pub use scheduler::{Scheduler, SchedulerBuilder};
