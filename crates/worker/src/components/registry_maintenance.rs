use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::registry::{ClusterRegistry, HeartbeatReport};

/// 一轮维护的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub heartbeat: HeartbeatReport,
    pub reclaimed: Vec<String>,
}

/// 每轮维护结束后的回调，调度器借此重试待接管的任务
#[async_trait]
pub trait MaintenanceListener: Send + Sync {
    async fn on_maintenance(&self, report: &MaintenanceReport);
}

/// 注册表维护循环：按心跳周期刷新归属，按清理周期回收过期记录
pub struct RegistryMaintenance {
    registry: Arc<ClusterRegistry>,
    heartbeat_tick: Duration,
    cleanup_interval: Duration,
    listener: Option<Arc<dyn MaintenanceListener>>,
}

impl RegistryMaintenance {
    pub fn new(registry: Arc<ClusterRegistry>) -> Self {
        let settings = registry.settings().clone();
        Self {
            registry,
            heartbeat_tick: settings.heartbeat_tick,
            cleanup_interval: settings.cleanup_interval,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn MaintenanceListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// 执行一轮维护，`cleanup` 为true时同时清理过期记录
    pub async fn run_cycle(&self, cleanup: bool) -> MaintenanceReport {
        let heartbeat = self.registry.heartbeat().await;
        let reclaimed = if cleanup {
            self.registry.cleanup_expired().await
        } else {
            Vec::new()
        };
        let report = MaintenanceReport {
            heartbeat,
            reclaimed,
        };
        debug!(
            "注册表维护完成: 刷新{}个, 丢失{}个, 回收{}个",
            report.heartbeat.refreshed,
            report.heartbeat.lost.len(),
            report.reclaimed.len()
        );

        if let Some(listener) = &self.listener {
            listener.on_maintenance(&report).await;
        }
        report
    }

    pub fn start(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let mut heartbeat_interval =
            interval_at(Instant::now() + self.heartbeat_tick, self.heartbeat_tick);
        heartbeat_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cleanup_interval =
            interval_at(Instant::now() + self.cleanup_interval, self.cleanup_interval);
        cleanup_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::spawn(async move {
            info!(
                "注册表维护已启动: 心跳周期{:?}, 清理周期{:?}",
                self.heartbeat_tick, self.cleanup_interval
            );
            loop {
                tokio::select! {
                    _ = heartbeat_interval.tick() => {
                        self.run_cycle(false).await;
                    }
                    _ = cleanup_interval.tick() => {
                        self.run_cycle(true).await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("注册表维护循环退出");
                        break;
                    }
                }
            }
        })
    }
}
