use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use scheduler_core::{errors::SchedulerError, keys::KeySpace, traits::RegistryStore, SchedulerResult};

use crate::redis_connection::RedisConnectionManager;

fn registry_error(action: &str, key: &str, e: redis::RedisError) -> SchedulerError {
    SchedulerError::Registry(format!("{action} {key} 失败: {e}"))
}

/// 基于Redis的注册表存储
///
/// 快照和心跳为带PX过期的字符串键，归属关系存放在一个hash中。
pub struct RedisRegistryStore {
    connection: RedisConnectionManager,
    keys: KeySpace,
}

impl RedisRegistryStore {
    pub fn new(connection: RedisConnectionManager, keys: KeySpace) -> Self {
        Self { connection, keys }
    }

    async fn set_px(&self, key: &str, value: String, ttl: Duration) -> SchedulerResult<()> {
        let mut conn = self.connection.connection();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| registry_error("写入", key, e))
    }

    async fn get_string(&self, key: &str) -> SchedulerResult<Option<String>> {
        let mut conn = self.connection.connection();
        conn.get(key)
            .await
            .map_err(|e| registry_error("读取", key, e))
    }

    async fn delete(&self, key: &str) -> SchedulerResult<()> {
        let mut conn = self.connection.connection();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| registry_error("删除", key, e))
    }
}

#[async_trait]
impl RegistryStore for RedisRegistryStore {
    async fn put_snapshot(
        &self,
        task_name: &str,
        payload: &str,
        ttl: Duration,
    ) -> SchedulerResult<()> {
        self.set_px(&self.keys.registry_task(task_name), payload.to_string(), ttl)
            .await
    }

    async fn get_snapshot(&self, task_name: &str) -> SchedulerResult<Option<String>> {
        self.get_string(&self.keys.registry_task(task_name)).await
    }

    async fn delete_snapshot(&self, task_name: &str) -> SchedulerResult<()> {
        self.delete(&self.keys.registry_task(task_name)).await
    }

    async fn put_heartbeat(
        &self,
        task_name: &str,
        epoch_ms: i64,
        ttl: Duration,
    ) -> SchedulerResult<()> {
        self.set_px(
            &self.keys.registry_heartbeat(task_name),
            epoch_ms.to_string(),
            ttl,
        )
        .await
    }

    async fn get_heartbeat(&self, task_name: &str) -> SchedulerResult<Option<i64>> {
        let key = self.keys.registry_heartbeat(task_name);
        match self.get_string(&key).await? {
            Some(raw) => raw.parse::<i64>().map(Some).map_err(|e| {
                SchedulerError::Registry(format!("无效的心跳时间戳 {key}={raw}: {e}"))
            }),
            None => Ok(None),
        }
    }

    async fn delete_heartbeat(&self, task_name: &str) -> SchedulerResult<()> {
        self.delete(&self.keys.registry_heartbeat(task_name)).await
    }

    async fn get_owner(&self, task_name: &str) -> SchedulerResult<Option<String>> {
        let key = self.keys.instance_map();
        let mut conn = self.connection.connection();
        conn.hget(&key, task_name)
            .await
            .map_err(|e| registry_error("读取", &key, e))
    }

    async fn set_owner(&self, task_name: &str, instance_id: &str) -> SchedulerResult<()> {
        let key = self.keys.instance_map();
        let mut conn = self.connection.connection();
        conn.hset::<_, _, _, ()>(&key, task_name, instance_id)
            .await
            .map_err(|e| registry_error("写入", &key, e))
    }

    async fn remove_owner(&self, task_name: &str) -> SchedulerResult<()> {
        let key = self.keys.instance_map();
        let mut conn = self.connection.connection();
        conn.hdel::<_, _, ()>(&key, task_name)
            .await
            .map_err(|e| registry_error("删除", &key, e))
    }

    async fn owners(&self) -> SchedulerResult<HashMap<String, String>> {
        let key = self.keys.instance_map();
        let mut conn = self.connection.connection();
        conn.hgetall(&key)
            .await
            .map_err(|e| registry_error("读取", &key, e))
    }
}
