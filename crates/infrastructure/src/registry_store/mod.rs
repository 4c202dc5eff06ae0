pub mod memory;
pub mod redis;

pub use self::memory::InMemoryRegistryStore;
pub use self::redis::RedisRegistryStore;
