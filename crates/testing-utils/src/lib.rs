//! # 调度器测试工具
//!
//! 各crate共享的测试替身与辅助函数：
//!
//! - [`handlers`]：计数、失败、panic、休眠、记录顺序等任务体
//! - [`builders`]：常用任务描述
//! - [`mocks`]：`LockService` 的mockall替身
//! - [`helpers`]：日志初始化、条件等待、进程内模拟集群
//!
//! ```toml
//! [dev-dependencies]
//! scheduler-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod handlers;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use handlers::*;
pub use helpers::*;
pub use mocks::MockLockService;
