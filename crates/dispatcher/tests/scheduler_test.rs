use std::sync::Arc;
use std::time::Duration;

use scheduler_core::{ScheduleState, SchedulerError, TaskDescriptor, TaskStatus};
use scheduler_dispatcher::{DispatcherSettings, Scheduler};
use scheduler_testing_utils::{
    fixed_delay_task, fixed_rate_task, grouped_task, manual_task, wait_until, CountingTask,
    ExecutionLog, FailingTask, InMemoryCluster, RecordingTask, SleepyTask,
};
use scheduler_worker::{ClusterRegistry, ExecutionOutcome, RegistrySettings, TaskExecutor};

fn dispatcher_settings() -> DispatcherSettings {
    DispatcherSettings {
        gather_window: Duration::from_millis(20),
        lane_shutdown_timeout: Duration::from_millis(500),
    }
}

fn local_scheduler(cluster: &InMemoryCluster) -> Scheduler {
    let backends = cluster.backends("node-a:8080");
    let executor = Arc::new(TaskExecutor::new(backends.lock, backends.keys));
    Scheduler::builder(executor)
        .dispatcher_settings(dispatcher_settings())
        .build()
}

fn clustered_scheduler(cluster: &InMemoryCluster, instance_id: &str) -> Scheduler {
    let backends = cluster.backends(instance_id);
    let executor = Arc::new(TaskExecutor::new(
        Arc::clone(&backends.lock),
        backends.keys.clone(),
    ));
    let registry = Arc::new(ClusterRegistry::new(
        instance_id,
        backends.store,
        backends.lock,
        backends.keys,
        RegistrySettings {
            heartbeat_interval: Duration::from_millis(100),
            heartbeat_tick: Duration::from_millis(30),
            cleanup_interval: Duration::from_millis(50),
            lock_wait: Duration::from_millis(50),
            lock_lease: Duration::from_secs(1),
        },
    ));
    Scheduler::builder(executor)
        .dispatcher_settings(dispatcher_settings())
        .registry(registry)
        .build()
}

#[tokio::test]
async fn test_register_rejects_invalid_trigger_and_duplicates() {
    let cluster = InMemoryCluster::new();
    let scheduler = local_scheduler(&cluster);

    let no_trigger = TaskDescriptor::builder("bare", CountingTask::new()).build();
    let err = scheduler.register(no_trigger).await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTrigger { .. }));

    let both = manual_task("both", CountingTask::new())
        .fixed_rate(Duration::from_secs(1))
        .build();
    assert!(scheduler.register(both).await.is_err());

    let bad_cron = TaskDescriptor::builder("bad-cron", CountingTask::new())
        .cron("not a cron")
        .build();
    let err = scheduler.register(bad_cron).await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidCron { .. }));

    scheduler
        .register(manual_task("report", CountingTask::new()).build())
        .await
        .unwrap();
    let err = scheduler
        .register(manual_task("report", CountingTask::new()).build())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::DuplicateTask { .. }));

    assert_eq!(scheduler.list_all().len(), 1);
    assert_eq!(scheduler.state("report"), Some(ScheduleState::Unscheduled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fixed_rate_task_fires_only_after_start() {
    let cluster = InMemoryCluster::new();
    let scheduler = local_scheduler(&cluster);
    let body = CountingTask::new();
    scheduler
        .register(fixed_rate_task("tick", Duration::from_millis(40), body.clone()).build())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(body.count(), 0);

    scheduler.start().unwrap();
    assert_eq!(scheduler.state("tick"), Some(ScheduleState::Scheduled));
    assert!(wait_until(Duration::from_secs(2), || body.count() >= 3).await);

    let stats = scheduler.get_stats("tick").unwrap();
    assert!(stats.execution_count >= 3);
    assert!(stats.next_execution_time.is_some());
    scheduler.destroy().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fixed_rate_honours_initial_delay() {
    let cluster = InMemoryCluster::new();
    let scheduler = local_scheduler(&cluster);
    let body = CountingTask::new();
    scheduler
        .register(
            fixed_rate_task("delayed", Duration::from_millis(30), body.clone())
                .initial_delay(Duration::from_millis(300))
                .build(),
        )
        .await
        .unwrap();
    scheduler.start().unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(body.count(), 0);
    assert!(wait_until(Duration::from_secs(2), || body.count() >= 1).await);
    scheduler.destroy().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fixed_delay_waits_for_previous_completion() {
    let cluster = InMemoryCluster::new();
    let scheduler = local_scheduler(&cluster);
    let body = SleepyTask::new(Duration::from_millis(150));
    let delay = Duration::from_millis(100);
    scheduler
        .register(fixed_delay_task("spaced", delay, body.clone()).build())
        .await
        .unwrap();
    scheduler.start().unwrap();

    assert!(wait_until(Duration::from_secs(3), || body.runs().len() >= 3).await);
    scheduler.stop().await;

    let runs = body.runs();
    for pair in runs.windows(2) {
        let (prev_start, prev_end) = pair[0];
        let (next_start, _) = pair[1];
        assert!(next_start.duration_since(prev_end) >= delay);
        assert!(next_start.duration_since(prev_start) >= Duration::from_millis(250));
    }
    assert_eq!(body.max_concurrency(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unregister_stops_further_firings() {
    let cluster = InMemoryCluster::new();
    let scheduler = local_scheduler(&cluster);
    let body = CountingTask::new();
    scheduler
        .register(fixed_rate_task("chatty", Duration::from_millis(20), body.clone()).build())
        .await
        .unwrap();
    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || body.count() >= 2).await);

    let descriptor = scheduler.descriptor("chatty").unwrap();
    scheduler.unregister("chatty").await.unwrap();
    assert!(!descriptor.has_subscription());
    assert_eq!(descriptor.schedule_state(), ScheduleState::Cancelled);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = body.count();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(body.count(), settled);

    assert!(scheduler.get("chatty").is_none());
    let err = scheduler.unregister("chatty").await.unwrap_err();
    assert!(matches!(err, SchedulerError::TaskNotFound { .. }));
    scheduler.destroy().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unregister_lets_in_flight_firing_finish() {
    let cluster = InMemoryCluster::new();
    let scheduler = local_scheduler(&cluster);
    let body = SleepyTask::new(Duration::from_millis(300));
    scheduler
        .register(
            fixed_rate_task("digest", Duration::from_millis(100), body.clone())
                .initial_delay(Duration::from_millis(150))
                .build(),
        )
        .await
        .unwrap();
    scheduler.start().unwrap();
    let descriptor = scheduler.descriptor("digest").unwrap();

    let (outcome, unregistered) = tokio::join!(scheduler.trigger_and_wait("digest"), async {
        assert!(wait_until(Duration::from_secs(1), || descriptor.is_running()).await);
        scheduler.unregister("digest").await
    });

    unregistered.unwrap();
    assert_eq!(outcome.unwrap(), ExecutionOutcome::Succeeded { attempts: 1 });
    assert_eq!(descriptor.stats().execution_count, 1);
    assert!(!descriptor.is_running());

    // 注销前定时器本应每100ms触发一次
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(body.runs().len(), 1);
    scheduler.destroy().await;
}

#[tokio::test]
async fn test_trigger_runs_once_through_dispatcher() {
    let cluster = InMemoryCluster::new();
    let scheduler = local_scheduler(&cluster);
    let body = CountingTask::new();
    scheduler
        .register(manual_task("on-demand", body.clone()).build())
        .await
        .unwrap();

    assert!(scheduler.trigger("on-demand"));
    assert!(wait_until(Duration::from_secs(1), || body.count() == 1).await);
    assert!(!scheduler.trigger("missing"));

    let outcome = scheduler.trigger_and_wait("on-demand").await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Succeeded { attempts: 1 });
    assert_eq!(body.count(), 2);
    assert_eq!(scheduler.get_stats("on-demand").unwrap().execution_count, 2);
}

#[tokio::test]
async fn test_retries_are_counted_as_one_error() {
    let cluster = InMemoryCluster::new();
    let scheduler = local_scheduler(&cluster);
    let body = FailingTask::always("boom");
    scheduler
        .register(
            manual_task("flaky", body.clone())
                .max_retries(2)
                .retry_delay(Duration::from_millis(100))
                .build(),
        )
        .await
        .unwrap();

    let outcome = scheduler.trigger_and_wait("flaky").await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Failed { attempts: 3 });
    assert_eq!(body.invocations(), 3);

    let stats = scheduler.get_stats("flaky").unwrap();
    assert_eq!(stats.error_count, 1);
    assert_eq!(stats.failed_attempts, 3);
    assert_eq!(stats.retry_count, 2);
    assert!(stats.last_error.unwrap().contains("boom"));

    let snapshot = scheduler.get("flaky").unwrap();
    assert_eq!(snapshot.status, TaskStatus::Error);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_grouped_tasks_run_in_order_when_fired_together() {
    let cluster = InMemoryCluster::new();
    let scheduler = local_scheduler(&cluster);
    let log = ExecutionLog::new();
    for (name, order) in [("third", 2), ("second", 1), ("first", 0)] {
        scheduler
            .register(grouped_task(name, "orderGroup1", order, RecordingTask::new(name, &log)).build())
            .await
            .unwrap();
    }

    for name in ["third", "second", "first"] {
        assert!(scheduler.trigger(name));
    }
    assert!(wait_until(Duration::from_secs(2), || log.len() == 3).await);
    assert_eq!(log.entries(), vec!["first", "second", "third"]);

    assert_eq!(scheduler.list_groups(), vec!["orderGroup1".to_string()]);
    let names: Vec<String> = scheduler.list_all().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["first", "second", "third"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pause_and_resume() {
    let cluster = InMemoryCluster::new();
    let scheduler = local_scheduler(&cluster);
    let body = CountingTask::new();
    scheduler
        .register(fixed_rate_task("pausable", Duration::from_millis(20), body.clone()).build())
        .await
        .unwrap();
    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || body.count() >= 1).await);

    scheduler.pause("pausable").unwrap();
    assert_eq!(scheduler.state("pausable"), Some(ScheduleState::Paused));
    assert_eq!(scheduler.get("pausable").unwrap().status, TaskStatus::Paused);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let paused_at = body.count();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(body.count(), paused_at);

    scheduler.resume("pausable").unwrap();
    assert_eq!(scheduler.state("pausable"), Some(ScheduleState::Scheduled));
    assert!(wait_until(Duration::from_secs(2), || body.count() > paused_at).await);

    assert!(matches!(
        scheduler.pause("missing"),
        Err(SchedulerError::TaskNotFound { .. })
    ));
    scheduler.destroy().await;
}

#[tokio::test]
async fn test_disabled_task_is_registered_but_never_bound() {
    let cluster = InMemoryCluster::new();
    let scheduler = local_scheduler(&cluster);
    let body = CountingTask::new();
    scheduler
        .register(
            fixed_rate_task("off", Duration::from_millis(10), body.clone())
                .enabled(false)
                .build(),
        )
        .await
        .unwrap();
    scheduler.start().unwrap();

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(body.count(), 0);
    let snapshot = scheduler.get("off").unwrap();
    assert_eq!(snapshot.status, TaskStatus::Disabled);
    assert!(!scheduler.descriptor("off").unwrap().has_subscription());
    scheduler.destroy().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_cancels_timers_and_start_rebinds() {
    let cluster = InMemoryCluster::new();
    let scheduler = local_scheduler(&cluster);
    let body = CountingTask::new();
    scheduler
        .register(fixed_rate_task("cycle", Duration::from_millis(20), body.clone()).build())
        .await
        .unwrap();

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || body.count() >= 1).await);
    scheduler.stop().await;
    assert!(!scheduler.is_started());
    assert_eq!(scheduler.state("cycle"), Some(ScheduleState::Cancelled));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stopped_at = body.count();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(body.count(), stopped_at);

    scheduler.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || body.count() > stopped_at).await);

    scheduler.destroy().await;
    assert!(scheduler.start().is_err());
    assert!(scheduler
        .register(manual_task("late", CountingTask::new()).build())
        .await
        .is_err());
    assert!(!scheduler.trigger("cycle"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_second_instance_stands_by_until_owner_releases() {
    let cluster = InMemoryCluster::new();
    let node_a = clustered_scheduler(&cluster, "node-a:8080");
    let node_b = clustered_scheduler(&cluster, "node-b:8080");
    let body_a = CountingTask::new();
    let body_b = CountingTask::new();

    node_a
        .register(fixed_rate_task("report", Duration::from_millis(30), body_a.clone()).build())
        .await
        .unwrap();
    node_b
        .register(fixed_rate_task("report", Duration::from_millis(30), body_b.clone()).build())
        .await
        .unwrap();
    assert_eq!(node_b.state("report"), Some(ScheduleState::Standby));
    assert_eq!(node_b.standby_tasks(), vec!["report".to_string()]);

    node_a.start().unwrap();
    node_b.start().unwrap();
    assert!(wait_until(Duration::from_secs(2), || body_a.count() >= 2).await);
    assert_eq!(body_b.count(), 0);
    assert!(node_b.try_takeover().await.is_empty());

    node_a.destroy().await;
    assert!(wait_until(Duration::from_secs(2), || {
        node_b.state("report") == Some(ScheduleState::Scheduled)
    })
    .await);
    assert!(wait_until(Duration::from_secs(2), || body_b.count() >= 1).await);
    assert_eq!(
        node_b.get("report").unwrap().owner_instance.as_deref(),
        Some("node-b:8080")
    );
    node_b.destroy().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stale_owner_is_reclaimed_by_standby_instance() {
    let cluster = InMemoryCluster::new();
    let node_a = clustered_scheduler(&cluster, "node-a:8080");
    let node_b = clustered_scheduler(&cluster, "node-b:8080");
    let body_b = CountingTask::new();

    node_a
        .register(fixed_rate_task("sync", Duration::from_millis(30), CountingTask::new()).build())
        .await
        .unwrap();
    node_a.start().unwrap();
    node_b
        .register(fixed_rate_task("sync", Duration::from_millis(30), body_b.clone()).build())
        .await
        .unwrap();
    node_b.start().unwrap();

    // 心跳新鲜时不会被回收
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(node_b.state("sync"), Some(ScheduleState::Standby));

    // 停止而不释放归属，相当于实例失联
    node_a.stop().await;
    assert!(wait_until(Duration::from_secs(3), || body_b.count() >= 1).await);
    assert_eq!(node_b.state("sync"), Some(ScheduleState::Scheduled));
    assert!(node_b.standby_tasks().is_empty());
    node_b.destroy().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_destroy_after_stop_releases_ownership() {
    let cluster = InMemoryCluster::new();
    let node_a = clustered_scheduler(&cluster, "node-a:8080");
    node_a
        .register(fixed_rate_task("ledger", Duration::from_millis(30), CountingTask::new()).build())
        .await
        .unwrap();
    node_a.start().unwrap();

    // 多轮启停，每次停止都可能落在一轮心跳中间
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(45)).await;
        node_a.stop().await;
        assert!(!node_a.is_started());
        node_a.start().unwrap();
    }
    node_a.stop().await;
    node_a.destroy().await;

    let registry = node_a.registry().unwrap();
    assert!(!registry.owns_locally("ledger"));
    assert!(!registry.is_registered("ledger").await.unwrap());

    let node_b = clustered_scheduler(&cluster, "node-b:8080");
    node_b
        .register(fixed_rate_task("ledger", Duration::from_millis(30), CountingTask::new()).build())
        .await
        .unwrap();
    assert_eq!(node_b.state("ledger"), Some(ScheduleState::Unscheduled));
    assert!(node_b.standby_tasks().is_empty());
    node_b.destroy().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_paused_standby_task_stays_paused_after_takeover() {
    let cluster = InMemoryCluster::new();
    let node_a = clustered_scheduler(&cluster, "node-a:8080");
    let node_b = clustered_scheduler(&cluster, "node-b:8080");
    let body_b = CountingTask::new();

    node_a
        .register(fixed_rate_task("audit", Duration::from_millis(30), CountingTask::new()).build())
        .await
        .unwrap();
    node_b
        .register(fixed_rate_task("audit", Duration::from_millis(30), body_b.clone()).build())
        .await
        .unwrap();
    node_a.start().unwrap();
    node_b.start().unwrap();
    node_b.pause("audit").unwrap();

    node_a.destroy().await;
    assert!(wait_until(Duration::from_secs(2), || node_b.standby_tasks().is_empty()).await);
    assert_eq!(node_b.state("audit"), Some(ScheduleState::Paused));
    assert_eq!(
        node_b.get("audit").unwrap().owner_instance.as_deref(),
        Some("node-b:8080")
    );
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(body_b.count(), 0);

    node_b.resume("audit").unwrap();
    assert_eq!(node_b.state("audit"), Some(ScheduleState::Scheduled));
    assert!(wait_until(Duration::from_secs(2), || body_b.count() >= 1).await);
    node_b.destroy().await;
}
