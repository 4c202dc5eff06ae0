use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::keys::DEFAULT_KEY_PREFIX;

/// 本实例的标识
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// 为空时使用 `<hostname>:<port>`
    pub instance_id: Option<String>,
    pub port: u16,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            instance_id: None,
            port: 8080,
        }
    }
}

impl InstanceConfig {
    pub fn resolve_instance_id(&self) -> String {
        match self.instance_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let host = hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| "localhost".to_string());
                format!("{}:{}", host, self.port)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(id) = &self.instance_id {
            if id.trim().is_empty() {
                return Err(anyhow::anyhow!("实例ID不能为空字符串"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Redis,
    Memory,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(BackendKind::Redis),
            "memory" | "in_memory" | "inmemory" => Ok(BackendKind::Memory),
            other => Err(anyhow::anyhow!("不支持的后端类型: {}", other)),
        }
    }
}

/// 锁与注册表的共享存储
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub redis_url: String,
    pub key_prefix: String,
    pub connect_timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            connect_timeout_seconds: 5,
        }
    }
}

impl BackendConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kind == BackendKind::Redis {
            if self.redis_url.is_empty() {
                return Err(anyhow::anyhow!("Redis连接URL不能为空"));
            }
            if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://")
            {
                return Err(anyhow::anyhow!(
                    "无效的Redis URL格式: {}",
                    self.redis_url
                ));
            }
        }
        if self.key_prefix.trim().is_empty() {
            return Err(anyhow::anyhow!("键前缀不能为空"));
        }
        if self.connect_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("连接超时时间必须大于0"));
        }
        Ok(())
    }
}
