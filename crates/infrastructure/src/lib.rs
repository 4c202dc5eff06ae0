//! 调度器基础设施
//!
//! 锁服务和注册表存储的Redis与进程内实现、Redis连接管理以及指标采集。

pub mod backend_factory;
pub mod lock;
pub mod observability;
pub mod redis_connection;
pub mod registry_store;

pub use backend_factory::{BackendFactory, ClusterBackends};
pub use lock::{InMemoryLockService, InMemoryLockStore, RedisLockService};
pub use observability::MetricsCollector;
pub use redis_connection::RedisConnectionManager;
pub use registry_store::{InMemoryRegistryStore, RedisRegistryStore};
