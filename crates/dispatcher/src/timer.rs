//! 定时器绑定
//!
//! 每个任务对应一个tokio任务，按触发方式计算下一次触发时间，
//! 触发时只把任务交给分组分发器，从不直接调用执行器。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use scheduler_core::{models::TimerSubscription, SchedulerResult, TaskDescriptor, Trigger};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cron_utils::CronScheduler;
use crate::group_dispatcher::GroupDispatcher;

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero())
}

/// 下一次cron触发时间
///
/// 墙上时钟可能略慢于tokio的单调时钟，醒来时 `now` 仍早于上一次触发时间，
/// 因此以两者中较晚的一个为起点，避免同一时刻触发两次。
fn next_cron_fire(
    cron: &CronScheduler,
    now: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let from = previous.map_or(now, |previous| previous.max(now));
    cron.next_execution_time(from)
}

/// 是否在定时器中等待本次执行结束
///
/// 固定延迟需要以上次执行结束为起点；默认分组的同步任务也在定时器中等待，
/// 其余情况只负责入队。
fn waits_for_completion(descriptor: &TaskDescriptor, trigger: &Trigger) -> bool {
    matches!(trigger, Trigger::FixedDelay(_))
        || (descriptor.is_default_group() && !descriptor.is_async)
}

async fn fire(descriptor: &Arc<TaskDescriptor>, dispatcher: &GroupDispatcher, wait: bool) {
    if descriptor.is_paused() || descriptor.is_retired() {
        return;
    }
    match dispatcher.dispatch(Arc::clone(descriptor)) {
        Ok(handle) => {
            if wait {
                if let Some(outcome) = handle.wait().await {
                    debug!("任务 {} 本次触发结束: {:?}", descriptor.name, outcome);
                }
            }
        }
        Err(e) => warn!("任务 {} 分发失败: {}", descriptor.name, e),
    }
}

/// 把任务的触发方式绑定到定时器，返回可取消的订阅
pub fn bind(
    descriptor: Arc<TaskDescriptor>,
    trigger: Trigger,
    dispatcher: Arc<GroupDispatcher>,
) -> SchedulerResult<TimerSubscription> {
    let wait = waits_for_completion(&descriptor, &trigger);

    let handle = match trigger {
        Trigger::Cron(expr) => {
            let cron = CronScheduler::new(&expr)?;
            info!(
                "绑定cron定时器: {} [{}] {}",
                descriptor.name,
                cron.expression(),
                cron.get_frequency_description()
            );
            tokio::spawn(async move {
                let mut previous = None;
                loop {
                    let now = Utc::now();
                    let Some(next) = next_cron_fire(&cron, now, previous) else {
                        warn!("任务 {} 的cron表达式没有后续触发时间", descriptor.name);
                        descriptor.set_next_execution_time(None);
                        break;
                    };
                    descriptor.set_next_execution_time(Some(next));
                    let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
                    tokio::time::sleep(delay).await;
                    previous = Some(next);
                    fire(&descriptor, &dispatcher, wait).await;
                }
            })
        }
        Trigger::FixedRate(rate) => {
            info!(
                "绑定固定频率定时器: {} 每{}ms, 初始延迟{}ms",
                descriptor.name,
                rate.as_millis(),
                descriptor.initial_delay.as_millis()
            );
            descriptor.set_next_execution_time(Some(Utc::now() + to_chrono(descriptor.initial_delay)));
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + descriptor.initial_delay, rate);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    descriptor.set_next_execution_time(Some(Utc::now() + to_chrono(rate)));
                    fire(&descriptor, &dispatcher, wait).await;
                }
            })
        }
        Trigger::FixedDelay(delay) => {
            info!(
                "绑定固定延迟定时器: {} 间隔{}ms, 初始延迟{}ms",
                descriptor.name,
                delay.as_millis(),
                descriptor.initial_delay.as_millis()
            );
            descriptor.set_next_execution_time(Some(Utc::now() + to_chrono(descriptor.initial_delay)));
            tokio::spawn(async move {
                tokio::time::sleep(descriptor.initial_delay).await;
                loop {
                    fire(&descriptor, &dispatcher, wait).await;
                    descriptor.set_next_execution_time(Some(Utc::now() + to_chrono(delay)));
                    tokio::time::sleep(delay).await;
                }
            })
        }
    };

    Ok(TimerSubscription::new(handle))
}
