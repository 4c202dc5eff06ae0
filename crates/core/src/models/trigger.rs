use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use cron::Schedule;
use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// 任务触发方式
///
/// cron / 固定速率 / 固定延迟三者互斥，注册时由 [`Trigger::resolve`] 校验。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// CRON表达式（已规范化为带秒字段的格式）
    Cron(String),
    /// 固定速率：按固定的时间间隔触发，与执行耗时无关
    FixedRate(Duration),
    /// 固定延迟：上一次执行完成后等待固定时长再触发
    FixedDelay(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    Cron,
    FixedRate,
    FixedDelay,
}

impl Trigger {
    /// 从原始配置解析触发器，要求有且仅有一种触发方式
    pub fn resolve(
        task_name: &str,
        cron: Option<&str>,
        fixed_rate: Option<Duration>,
        fixed_delay: Option<Duration>,
    ) -> SchedulerResult<Self> {
        let cron = cron.map(str::trim).filter(|c| !c.is_empty());

        let mut configured = Vec::new();
        if cron.is_some() {
            configured.push("cron");
        }
        if fixed_rate.is_some() {
            configured.push("fixed_rate");
        }
        if fixed_delay.is_some() {
            configured.push("fixed_delay");
        }

        match configured.len() {
            0 => {
                return Err(SchedulerError::InvalidTrigger {
                    name: task_name.to_string(),
                    reason: "必须设置 cron、fixed_rate、fixed_delay 中的一种".to_string(),
                })
            }
            1 => {}
            _ => {
                return Err(SchedulerError::InvalidTrigger {
                    name: task_name.to_string(),
                    reason: format!("触发方式互斥，但同时设置了: {}", configured.join(", ")),
                })
            }
        }

        if let Some(expr) = cron {
            let normalized = normalize_cron(expr);
            Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
                expr: expr.to_string(),
                message: e.to_string(),
            })?;
            return Ok(Trigger::Cron(normalized));
        }

        if let Some(rate) = fixed_rate {
            if rate.is_zero() {
                return Err(SchedulerError::InvalidTrigger {
                    name: task_name.to_string(),
                    reason: "fixed_rate 必须大于0".to_string(),
                });
            }
            return Ok(Trigger::FixedRate(rate));
        }

        match fixed_delay {
            Some(delay) if !delay.is_zero() => Ok(Trigger::FixedDelay(delay)),
            _ => Err(SchedulerError::InvalidTrigger {
                name: task_name.to_string(),
                reason: "fixed_delay 必须大于0".to_string(),
            }),
        }
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Cron(_) => TriggerKind::Cron,
            Trigger::FixedRate(_) => TriggerKind::FixedRate,
            Trigger::FixedDelay(_) => TriggerKind::FixedDelay,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Cron(expr) => write!(f, "cron({expr})"),
            Trigger::FixedRate(rate) => write!(f, "fixed_rate({}ms)", rate.as_millis()),
            Trigger::FixedDelay(delay) => write!(f, "fixed_delay({}ms)", delay.as_millis()),
        }
    }
}

/// 将5段式的unix cron补齐秒字段，并把 `?` 视为任意值
pub fn normalize_cron(expr: &str) -> String {
    let fields: Vec<&str> = expr
        .split_whitespace()
        .map(|f| if f == "?" { "*" } else { f })
        .collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}
