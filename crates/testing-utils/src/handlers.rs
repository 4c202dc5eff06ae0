//! 测试用任务体

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use scheduler_core::traits::TaskHandler;
use tokio::time::Instant;

/// 统计调用次数，可选地在每次调用中休眠
#[derive(Debug, Default)]
pub struct CountingTask {
    count: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingTask {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            count: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for CountingTask {
    async fn run(&self) -> anyhow::Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

/// 前 `failures` 次调用返回错误，之后成功
#[derive(Debug)]
pub struct FailingTask {
    invocations: AtomicUsize,
    failures: usize,
    message: String,
}

impl FailingTask {
    /// 每次都失败
    pub fn always(message: &str) -> Arc<Self> {
        Self::failing_first(usize::MAX, message)
    }

    pub fn failing_first(failures: usize, message: &str) -> Arc<Self> {
        Arc::new(Self {
            invocations: AtomicUsize::new(0),
            failures,
            message: message.to_string(),
        })
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for FailingTask {
    async fn run(&self) -> anyhow::Result<()> {
        let previous = self.invocations.fetch_add(1, Ordering::SeqCst);
        if previous < self.failures {
            anyhow::bail!("{}", self.message);
        }
        Ok(())
    }
}

/// 任务体中直接panic
#[derive(Debug, Default)]
pub struct PanickingTask {
    invocations: AtomicUsize,
}

impl PanickingTask {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for PanickingTask {
    async fn run(&self) -> anyhow::Result<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        panic!("boom");
    }
}

/// 休眠固定时长并记录每次执行的起止时间与最大并发
#[derive(Debug)]
pub struct SleepyTask {
    duration: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    runs: Mutex<Vec<(Instant, Instant)>>,
}

impl SleepyTask {
    pub fn new(duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            duration,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            runs: Mutex::new(Vec::new()),
        })
    }

    /// 每次执行的 (开始, 结束) 时间
    pub fn runs(&self) -> Vec<(Instant, Instant)> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskHandler for SleepyTask {
    async fn run(&self) -> anyhow::Result<()> {
        let started = Instant::now();
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        tokio::time::sleep(self.duration).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((started, Instant::now()));
        Ok(())
    }
}

/// 多个任务共享的执行顺序记录
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 执行时把标签写入 [`ExecutionLog`]
#[derive(Debug)]
pub struct RecordingTask {
    label: String,
    log: ExecutionLog,
    delay: Duration,
}

impl RecordingTask {
    pub fn new(label: &str, log: &ExecutionLog) -> Arc<Self> {
        Self::with_delay(label, log, Duration::ZERO)
    }

    pub fn with_delay(label: &str, log: &ExecutionLog, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            log: log.clone(),
            delay,
        })
    }
}

#[async_trait]
impl TaskHandler for RecordingTask {
    async fn run(&self) -> anyhow::Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.log.push(&self.label);
        Ok(())
    }
}
