use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::Client;
use scheduler_core::{errors::SchedulerError, SchedulerResult};
use tracing::{debug, error};

/// Redis连接管理
///
/// 内部的 [`ConnectionManager`] 会在连接断开后自动重连，克隆开销很小，
/// 锁服务与注册表存储共享同一个实例。
#[derive(Clone)]
pub struct RedisConnectionManager {
    manager: ConnectionManager,
    url: String,
}

impl RedisConnectionManager {
    pub async fn connect(url: &str, connect_timeout: Duration) -> SchedulerResult<Self> {
        let client = Client::open(url).map_err(|e| {
            SchedulerError::Configuration(format!("创建Redis客户端失败: {e}"))
        })?;

        let manager = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                SchedulerError::Internal(format!(
                    "连接Redis超时({}s): {url}",
                    connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| SchedulerError::Internal(format!("连接Redis失败: {e}")))?;

        let connection = Self {
            manager,
            url: url.to_string(),
        };
        connection.ping().await?;
        debug!("已连接到Redis: {}", connection.url);

        Ok(connection)
    }

    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn ping(&self) -> SchedulerResult<()> {
        let mut conn = self.connection();
        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis PING失败: {e}");
                SchedulerError::Internal(format!("Redis PING失败: {e}"))
            })?;

        if response == "PONG" {
            Ok(())
        } else {
            let error_msg = format!("意外的PING响应: {response}");
            error!("{}", error_msg);
            Err(SchedulerError::Internal(error_msg))
        }
    }
}
