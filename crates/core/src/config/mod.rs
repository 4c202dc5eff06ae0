//! 配置管理
//!
//! [`AppConfig`] 由TOML文件与 `SCHEDULER_` 前缀的环境变量组合而成，
//! 各运行时组件再从中构造自己的设置结构。

pub mod models;

pub use models::{
    AppConfig, BackendConfig, BackendKind, DispatcherConfig, ExecutorConfig, InstanceConfig,
    LockConfig, ObservabilityConfig, RegistryConfig,
};
