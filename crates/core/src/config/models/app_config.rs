use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    instance_backend::{BackendConfig, InstanceConfig},
    observability::ObservabilityConfig,
    scheduling::{DispatcherConfig, ExecutorConfig, LockConfig, RegistryConfig},
};

/// 调度器配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub instance: InstanceConfig,
    pub backend: BackendConfig,
    pub lock: LockConfig,
    pub registry: RegistryConfig,
    pub executor: ExecutorConfig,
    pub dispatcher: DispatcherConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序：
    /// 1. 默认值
    /// 2. 配置文件（TOML）
    /// 3. 环境变量覆盖（前缀 `SCHEDULER_`，层级分隔符 `__`，
    ///    例如 `SCHEDULER_BACKEND__KIND=redis`）
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/scheduler.toml",
                "scheduler.toml",
                "/etc/scheduler/config.toml",
            ];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SCHEDULER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.instance.validate().context("实例配置验证失败")?;
        self.backend.validate().context("后端配置验证失败")?;
        self.lock.validate().context("锁配置验证失败")?;
        self.registry.validate().context("注册表配置验证失败")?;
        self.executor.validate().context("执行器配置验证失败")?;
        self.dispatcher
            .validate()
            .context("分发器配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }

    pub fn instance_id(&self) -> String {
        self.instance.resolve_instance_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::BackendKind;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backend.kind, BackendKind::Memory);
        assert_eq!(config.registry.heartbeat_interval_seconds, 30);
        assert_eq!(config.registry.heartbeat_tick_seconds, 10);
        assert_eq!(config.registry.cleanup_interval_seconds, 300);
        assert_eq!(config.executor.default_lock_hold_seconds, 300);
        assert_eq!(config.dispatcher.lane_shutdown_timeout_seconds, 2);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [instance]
            instance_id = "node-a:9000"

            [backend]
            kind = "redis"
            redis_url = "redis://cache:6379"
            "#,
        )
        .unwrap();

        assert_eq!(config.instance_id(), "node-a:9000");
        assert_eq!(config.backend.kind, BackendKind::Redis);
        assert_eq!(config.backend.key_prefix, "schedule");
        assert_eq!(config.lock.retry_interval_ms, 100);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.registry.lock_wait_seconds, config.registry.lock_wait_seconds);
        assert_eq!(parsed.observability.log_format, "pretty");
    }

    #[test]
    fn test_validation_failures() {
        let mut config = AppConfig::default();
        config.registry.heartbeat_interval_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.registry.cleanup_interval_seconds = 10;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.backend.kind = BackendKind::Redis;
        config.backend.redis_url = "http://wrong".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.observability.log_format = "xml".to_string();
        assert!(config.validate().is_err());

        assert!(AppConfig::from_toml("[backend]\nkind = \"etcd\"\n").is_err());
    }

    #[test]
    fn test_heartbeat_tick_must_be_shorter_than_interval() {
        let mut config = AppConfig::default();
        config.registry.heartbeat_interval_seconds = 10;
        config.registry.heartbeat_tick_seconds = 60;
        config.registry.cleanup_interval_seconds = 10;
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("心跳刷新周期"));

        config.registry.heartbeat_tick_seconds = 10;
        assert!(config.validate().is_err());

        config.registry.heartbeat_tick_seconds = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_instance_id_uses_port() {
        let config = AppConfig::from_toml("[instance]\nport = 7001\n").unwrap();
        assert!(config.instance_id().ends_with(":7001"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[registry]\nheartbeat_interval_seconds = 15\ncleanup_interval_seconds = 60\n\n[dispatcher]\ngather_window_ms = 5"
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.registry.heartbeat_interval_seconds, 15);
        assert_eq!(config.registry.cleanup_interval_seconds, 60);
        assert_eq!(config.dispatcher.gather_window_ms, 5);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = AppConfig::load(Some("/nonexistent/scheduler.toml"));
        assert!(result.is_err());
    }
}
