use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// 等待锁时的轮询间隔
    pub retry_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 100,
        }
    }
}

impl LockConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retry_interval_ms == 0 {
            return Err(anyhow::anyhow!("锁轮询间隔必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub enabled: bool,
    /// 快照TTL为3倍、心跳TTL和过期判定为2倍
    pub heartbeat_interval_seconds: u64,
    pub heartbeat_tick_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub lock_wait_seconds: u64,
    pub lock_lease_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_interval_seconds: 30,
            heartbeat_tick_seconds: 10,
            cleanup_interval_seconds: 300,
            lock_wait_seconds: 5,
            lock_lease_seconds: 30,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }
        if self.heartbeat_tick_seconds == 0 {
            return Err(anyhow::anyhow!("心跳刷新周期必须大于0"));
        }
        // 心跳TTL为2倍间隔，刷新周期不小于间隔时键可能在两次刷新之间过期
        if self.heartbeat_tick_seconds >= self.heartbeat_interval_seconds {
            return Err(anyhow::anyhow!(
                "心跳刷新周期({}s)必须小于心跳间隔({}s)",
                self.heartbeat_tick_seconds,
                self.heartbeat_interval_seconds
            ));
        }
        if self.cleanup_interval_seconds < self.heartbeat_interval_seconds {
            return Err(anyhow::anyhow!(
                "清理周期({}s)不能小于心跳间隔({}s)",
                self.cleanup_interval_seconds,
                self.heartbeat_interval_seconds
            ));
        }
        if self.lock_lease_seconds == 0 {
            return Err(anyhow::anyhow!("注册表锁租约必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub default_lock_hold_seconds: u64,
    pub shutdown_grace_seconds: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_lock_hold_seconds: 300,
            shutdown_grace_seconds: 10,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_lock_hold_seconds == 0 {
            return Err(anyhow::anyhow!("执行锁持有时间必须大于0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 分组队列从空闲被唤醒后收集同批提交的等待时间
    pub gather_window_ms: u64,
    pub lane_shutdown_timeout_seconds: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            gather_window_ms: 20,
            lane_shutdown_timeout_seconds: 2,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lane_shutdown_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("分组队列关闭超时必须大于0"));
        }
        Ok(())
    }
}
