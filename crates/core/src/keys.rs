//! 共享存储中的键布局
//!
//! 所有键都带有可配置前缀，例如默认前缀下任务 `sync` 的执行锁为 `schedule:lock:sync`。

pub const DEFAULT_KEY_PREFIX: &str = "schedule";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 任务执行互斥锁
    pub fn task_lock(&self, task_name: &str) -> String {
        format!("{}:lock:{}", self.prefix, task_name)
    }

    /// 注册中心按任务名加的锁
    pub fn registry_lock(&self, task_name: &str) -> String {
        format!("{}:registry:lock:{}", self.prefix, task_name)
    }

    /// 任务描述快照
    pub fn registry_task(&self, task_name: &str) -> String {
        format!("{}:registry:task:{}", self.prefix, task_name)
    }

    pub fn registry_heartbeat(&self, task_name: &str) -> String {
        format!("{}:registry:heartbeat:{}", self.prefix, task_name)
    }

    /// 任务 -> 所属实例 的映射表
    pub fn instance_map(&self) -> String {
        format!("{}:registry:instance-map", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = KeySpace::default();
        assert_eq!(keys.task_lock("sync"), "schedule:lock:sync");
        assert_eq!(keys.registry_lock("sync"), "schedule:registry:lock:sync");
        assert_eq!(keys.registry_task("sync"), "schedule:registry:task:sync");
        assert_eq!(
            keys.registry_heartbeat("sync"),
            "schedule:registry:heartbeat:sync"
        );
        assert_eq!(keys.instance_map(), "schedule:registry:instance-map");
    }

    #[test]
    fn test_custom_prefix() {
        let keys = KeySpace::new("app-a");
        assert_eq!(keys.task_lock("x"), "app-a:lock:x");
    }
}
