//! 任务执行与集群注册
//!
//! - [`TaskExecutor`]：在集群锁保护下执行一次触发，负责去重、重试与统计
//! - [`ClusterRegistry`]：任务归属、心跳与过期回收
//! - [`RegistryMaintenance`]：注册表的后台维护循环

pub mod components;
pub mod executor;
pub mod registry;

pub use components::{MaintenanceListener, MaintenanceReport, RegistryMaintenance};
pub use executor::{ExecutionOutcome, SkipReason, TaskExecutor};
pub use registry::{ClusterRegistry, HeartbeatReport, RegistrySettings};
