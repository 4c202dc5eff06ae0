use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

/// 活跃的定时器订阅
///
/// 取消只会停止后续触发，已经交给分发器的执行不受影响。
#[derive(Debug)]
pub struct TimerSubscription {
    handle: JoinHandle<()>,
    bound_at: DateTime<Utc>,
}

impl TimerSubscription {
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self {
            handle,
            bound_at: Utc::now(),
        }
    }

    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn bound_at(&self) -> DateTime<Utc> {
        self.bound_at
    }
}

impl Drop for TimerSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
