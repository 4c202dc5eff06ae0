use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 执行耗时统计（毫秒，墙钟时间）
///
/// `min_ms` 在首次成功执行前保持为 `u64::MAX`。
#[derive(Debug, Clone, PartialEq)]
pub struct DurationStats {
    pub last_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub total_ms: u64,
    pub average_ms: f64,
}

impl Default for DurationStats {
    fn default() -> Self {
        Self {
            last_ms: 0,
            min_ms: u64::MAX,
            max_ms: 0,
            total_ms: 0,
            average_ms: 0.0,
        }
    }
}

impl DurationStats {
    /// 记录一次成功执行的耗时，`execution_count` 为包含本次在内的成功次数
    pub fn record(&mut self, duration_ms: u64, execution_count: u64) {
        self.last_ms = duration_ms;
        self.total_ms = self.total_ms.saturating_add(duration_ms);
        self.max_ms = self.max_ms.max(duration_ms);
        self.min_ms = self.min_ms.min(duration_ms);
        if execution_count > 0 {
            self.average_ms = self.total_ms as f64 / execution_count as f64;
        }
    }

    pub fn min(&self) -> Option<u64> {
        (self.min_ms != u64::MAX).then_some(self.min_ms)
    }
}

/// 对外暴露的任务执行统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// 成功完成的次数
    pub execution_count: u64,
    /// 以失败告终（重试耗尽）的触发次数
    pub error_count: u64,
    /// 失败的单次尝试总数
    pub failed_attempts: u64,
    /// 发起的重试总数
    pub retry_count: u64,
    pub last_error: Option<String>,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub next_execution_time: Option<DateTime<Utc>>,
    pub last_duration_ms: u64,
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: u64,
    pub total_duration_ms: u64,
    pub average_duration_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_starts_at_sentinel() {
        let stats = DurationStats::default();
        assert_eq!(stats.min_ms, u64::MAX);
        assert_eq!(stats.min(), None);
    }

    #[test]
    fn test_record_updates_all_fields() {
        let mut stats = DurationStats::default();
        stats.record(100, 1);
        stats.record(300, 2);
        stats.record(200, 3);

        assert_eq!(stats.last_ms, 200);
        assert_eq!(stats.min(), Some(100));
        assert_eq!(stats.max_ms, 300);
        assert_eq!(stats.total_ms, 600);
        assert!((stats.average_ms - 200.0).abs() < f64::EPSILON);
    }
}
