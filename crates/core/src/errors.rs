use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("任务 {name} 的触发器配置无效: {reason}")]
    InvalidTrigger { name: String, reason: String },

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("任务已存在: {name}")]
    DuplicateTask { name: String },

    #[error("任务未找到: {name}")]
    TaskNotFound { name: String },

    #[error("无效的任务描述: {0}")]
    InvalidDescriptor(String),

    #[error("分布式锁错误: {0}")]
    Lock(String),

    #[error("注册中心错误: {0}")]
    Registry(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// 注册阶段的配置错误，调用方应直接拒绝注册
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            SchedulerError::InvalidTrigger { .. }
                | SchedulerError::InvalidCron { .. }
                | SchedulerError::DuplicateTask { .. }
                | SchedulerError::InvalidDescriptor(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(e: serde_json::Error) -> Self {
        SchedulerError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
