//! mockall生成的接口替身

use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use scheduler_core::SchedulerResult;

mock! {
    pub LockService {}

    #[async_trait]
    impl scheduler_core::traits::LockService for LockService {
        async fn try_lock(&self, key: &str, wait: Duration, lease: Duration) -> SchedulerResult<bool>;
        async fn unlock(&self, key: &str) -> SchedulerResult<()>;
        async fn is_held_by_caller(&self, key: &str) -> SchedulerResult<bool>;
    }
}
