use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExecutionStats, ScheduleState, TaskStatus};

/// 任务描述的可序列化快照
///
/// 既用于查询接口，也是集群注册表中保存的任务信息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorSnapshot {
    pub name: String,
    pub group: String,
    pub trigger: String,
    pub cron: Option<String>,
    pub fixed_rate_ms: Option<u64>,
    pub fixed_delay_ms: Option<u64>,
    pub initial_delay_ms: u64,
    pub order: i32,
    pub is_async: bool,
    pub enabled: bool,
    pub description: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: Option<u64>,
    pub distributed: bool,
    pub running: bool,
    pub paused: bool,
    pub status: TaskStatus,
    pub schedule_state: ScheduleState,
    pub stats: ExecutionStats,
    pub owner_instance: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl DescriptorSnapshot {
    pub fn to_json(&self) -> crate::SchedulerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> crate::SchedulerResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}
