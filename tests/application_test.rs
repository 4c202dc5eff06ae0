use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use cluster_scheduler::app::Application;
use cluster_scheduler::demo_tasks::ORDER_GROUP;
use cluster_scheduler::shutdown::ShutdownManager;
use scheduler_core::{AppConfig, ScheduleState};
use scheduler_testing_utils::wait_until;

fn load_config(contents: &str) -> AppConfig {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    AppConfig::load(file.path().to_str()).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_application_runs_until_shutdown() {
    let config = load_config(
        r#"
[instance]
instance_id = "test-node:8080"

[backend]
kind = "memory"

[executor]
shutdown_grace_seconds = 2
"#,
    );
    assert_eq!(config.instance_id(), "test-node:8080");

    let app = Arc::new(Application::new(config).await.unwrap());
    let scheduler = app.scheduler().clone();
    assert_eq!(scheduler.list_all().len(), 6);
    assert!(scheduler.list_groups().contains(&ORDER_GROUP.to_string()));

    let shutdown = ShutdownManager::new();
    let shutdown_rx = shutdown.subscribe().await;
    let runner = {
        let app = Arc::clone(&app);
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    assert!(wait_until(Duration::from_secs(2), || scheduler.is_started()).await);
    assert_eq!(
        scheduler.state("cluster-report"),
        Some(ScheduleState::Scheduled)
    );
    let owner = scheduler.get("cluster-report").unwrap().owner_instance;
    assert_eq!(owner.as_deref(), Some("test-node:8080"));

    shutdown.shutdown().await;
    runner.await.unwrap().unwrap();

    assert!(!scheduler.is_started());
    assert!(scheduler.start().is_err());
}
