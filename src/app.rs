use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use scheduler_core::AppConfig;
use scheduler_dispatcher::{DispatcherSettings, Scheduler};
use scheduler_infrastructure::{BackendFactory, MetricsCollector};
use scheduler_worker::{ClusterRegistry, RegistrySettings, TaskExecutor};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::demo_tasks;

/// 主应用程序：组装后端、执行器、注册表与调度器
pub struct Application {
    config: AppConfig,
    instance_id: String,
    scheduler: Scheduler,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let instance_id = config.instance_id();
        info!("初始化调度实例: {}", instance_id);

        let backends = BackendFactory::create(&config, &instance_id)
            .await
            .context("创建锁与注册表后端失败")?;

        let executor = Arc::new(
            TaskExecutor::new(Arc::clone(&backends.lock), backends.keys.clone())
                .with_metrics(MetricsCollector::new()),
        );

        let mut builder =
            Scheduler::builder(executor).dispatcher_settings(DispatcherSettings::from(&config));
        if config.registry.enabled {
            let registry = Arc::new(ClusterRegistry::new(
                instance_id.clone(),
                backends.store,
                backends.lock,
                backends.keys,
                RegistrySettings::from(&config),
            ));
            builder = builder.registry(registry);
        } else {
            info!("集群注册表未启用，所有任务在本实例调度");
        }
        let scheduler = builder.build();

        demo_tasks::register_demo_tasks(&scheduler, &config)
            .await
            .context("注册示例任务失败")?;

        Ok(Self {
            config,
            instance_id,
            scheduler,
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// 启动调度并运行到收到关闭信号
    ///
    /// 调度器最后启动、最先停止，停止后在宽限期内销毁。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.scheduler.start().context("启动调度器失败")?;
        info!(
            "实例 {} 已开始调度: 任务{}个, 分组{:?}",
            self.instance_id,
            self.scheduler.list_all().len(),
            self.scheduler.list_groups()
        );

        let _ = shutdown_rx.recv().await;
        info!("停止调度器");
        self.scheduler.stop().await;

        let grace = Duration::from_secs(self.config.executor.shutdown_grace_seconds);
        if tokio::time::timeout(grace, self.scheduler.destroy())
            .await
            .is_err()
        {
            warn!("调度器未能在{}秒内完成销毁", grace.as_secs());
        }

        for snapshot in self.scheduler.list_all() {
            info!(
                "任务 {} 共执行{}次, 失败{}次",
                snapshot.name, snapshot.stats.execution_count, snapshot.stats.error_count
            );
        }
        Ok(())
    }
}
