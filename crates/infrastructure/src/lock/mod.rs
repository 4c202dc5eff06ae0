//! 集群锁实现
//!
//! 每个锁客户端持有形如 `<instanceId>:<uuid>` 的令牌，同一进程内的两个客户端
//! 相当于两个独立实例。

pub mod memory;
pub mod redis;

pub use self::memory::{InMemoryLockService, InMemoryLockStore};
pub use self::redis::RedisLockService;

pub(crate) fn client_token(instance_id: &str) -> String {
    format!("{}:{}", instance_id, uuid::Uuid::new_v4())
}
