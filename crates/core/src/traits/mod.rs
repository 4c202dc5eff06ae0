pub mod lock;
pub mod registry_store;
pub mod task_handler;

pub use lock::LockService;
pub use registry_store::RegistryStore;
pub use task_handler::{task_fn, FnTask, TaskHandler};
