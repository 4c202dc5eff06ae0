pub mod app_config;
pub mod instance_backend;
pub mod observability;
pub mod scheduling;

pub use app_config::AppConfig;
pub use instance_backend::{BackendConfig, BackendKind, InstanceConfig};
pub use observability::ObservabilityConfig;
pub use scheduling::{DispatcherConfig, ExecutorConfig, LockConfig, RegistryConfig};
