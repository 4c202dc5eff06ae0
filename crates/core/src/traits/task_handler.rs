//! 任务体接口
//!
//! 调度器只关心任务体的执行结果：返回 `Err` 或 panic 都视为失败，
//! 由执行器负责重试与统计。
//!
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use scheduler_core::traits::{task_fn, TaskHandler};
//!
//! struct CleanupTask;
//!
//! #[async_trait]
//! impl TaskHandler for CleanupTask {
//!     async fn run(&self) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let handler: Arc<dyn TaskHandler> = Arc::new(CleanupTask);
//! let closure = task_fn(|| async { Ok(()) });
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self) -> anyhow::Result<()>;
}

/// 基于闭包的任务体
pub struct FnTask<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> TaskHandler for FnTask<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn run(&self) -> anyhow::Result<()> {
        (self.func)().await
    }
}

pub fn task_fn<F, Fut>(func: F) -> Arc<dyn TaskHandler>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnTask { func })
}
