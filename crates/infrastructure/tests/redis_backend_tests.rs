//! 需要Docker，默认忽略：`cargo test -- --ignored`

use std::time::Duration;

use anyhow::Result;
use scheduler_core::{
    keys::KeySpace,
    traits::{LockService, RegistryStore},
};
use scheduler_infrastructure::{RedisConnectionManager, RedisLockService, RedisRegistryStore};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::{Redis, REDIS_PORT};

async fn start_redis() -> Result<(ContainerAsync<Redis>, RedisConnectionManager)> {
    let container = Redis::default().with_tag("7-alpine").start().await?;
    let port = container.get_host_port_ipv4(REDIS_PORT).await?;
    let url = format!("redis://127.0.0.1:{port}");
    let connection = RedisConnectionManager::connect(&url, Duration::from_secs(5)).await?;
    Ok((container, connection))
}

#[tokio::test]
#[ignore]
async fn test_redis_lock_is_exclusive_per_client() -> Result<()> {
    let (_container, connection) = start_redis().await?;
    let a = RedisLockService::new(connection.clone(), "node-a:8080", Duration::from_millis(20));
    let b = RedisLockService::new(connection, "node-b:8080", Duration::from_millis(20));
    let lease = Duration::from_secs(30);

    assert!(a.try_lock("schedule:lock:job", Duration::ZERO, lease).await?);
    assert!(!b.try_lock("schedule:lock:job", Duration::ZERO, lease).await?);
    assert!(a.is_held_by_caller("schedule:lock:job").await?);

    b.unlock("schedule:lock:job").await?;
    assert!(a.is_held_by_caller("schedule:lock:job").await?);

    a.unlock("schedule:lock:job").await?;
    assert!(b.try_lock("schedule:lock:job", Duration::ZERO, lease).await?);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_redis_lock_waits_for_lease_expiry() -> Result<()> {
    let (_container, connection) = start_redis().await?;
    let a = RedisLockService::new(connection.clone(), "node-a:8080", Duration::from_millis(20));
    let b = RedisLockService::new(connection, "node-b:8080", Duration::from_millis(20));

    assert!(a.try_lock("k", Duration::ZERO, Duration::from_millis(200)).await?);
    assert!(b.try_lock("k", Duration::from_secs(2), Duration::from_secs(5)).await?);
    assert!(!a.is_held_by_caller("k").await?);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_redis_registry_store_roundtrip() -> Result<()> {
    let (_container, connection) = start_redis().await?;
    let store = RedisRegistryStore::new(connection, KeySpace::default());

    store
        .put_snapshot("report", r#"{"name":"report"}"#, Duration::from_secs(90))
        .await?;
    store
        .put_heartbeat("report", 1_700_000_000_000, Duration::from_millis(300))
        .await?;
    store.set_owner("report", "node-a:8080").await?;

    assert_eq!(
        store.get_snapshot("report").await?.as_deref(),
        Some(r#"{"name":"report"}"#)
    );
    assert_eq!(store.get_heartbeat("report").await?, Some(1_700_000_000_000));
    assert_eq!(
        store.owners().await?.get("report").map(String::as_str),
        Some("node-a:8080")
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(store.get_heartbeat("report").await?, None);

    store.delete_snapshot("report").await?;
    store.remove_owner("report").await?;
    assert!(store.get_snapshot("report").await?.is_none());
    assert!(store.get_owner("report").await?.is_none());
    Ok(())
}
