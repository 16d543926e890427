//! Full `LabelSync` pipeline over the static docker client.

use std::sync::Arc;
use std::time::Duration;

use labelsync_core::config::AgentConfig;
use labelsync_core::pipeline::{HealthStatus, Pipeline};
use labelsync_reconciler::{LabelSync, LabelSyncBuilder, StatusHandle, SyncError};

use crate::helpers::containers::{container_a, container_b};
use crate::helpers::mock_api::MockProxyApi;
use crate::helpers::mock_docker::StaticDocker;

fn build(docker: StaticDocker) -> (LabelSync<StaticDocker, MockProxyApi>, Arc<MockProxyApi>) {
    let mut config = AgentConfig::default();
    config.npm.letsencrypt_email = "ops@example.com".to_owned();
    let api = Arc::new(MockProxyApi::new());
    let sync = LabelSyncBuilder::new()
        .config(&config)
        .docker_client(Arc::new(docker))
        .proxy_api(Arc::clone(&api))
        .build()
        .unwrap();
    (sync, api)
}

async fn wait_for_synced(status: &mut StatusHandle, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if status.current().synced == expected {
                return;
            }
            if status.changed().await.is_none() {
                panic!("engine stopped before syncing");
            }
        }
    })
    .await
    .expect("containers were not synced in time");
}

#[tokio::test]
async fn pipeline_syncs_running_containers() {
    let (mut sync, api) = build(StaticDocker::new(vec![container_a(), container_b()]));
    let mut status = sync.status_handle();
    assert_eq!(sync.state_name(), "initialized");

    sync.start().await.unwrap();
    assert_eq!(sync.state_name(), "running");

    wait_for_synced(&mut status, 2).await;
    assert_eq!(api.creates().len(), 2);

    let runtime = sync.runtime_status();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !runtime.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("runtime never reported connected");
    assert_eq!(sync.health_check().await, HealthStatus::Healthy);

    sync.stop().await.unwrap();
    assert_eq!(sync.state_name(), "stopped");
    assert!(sync.health_check().await.is_unhealthy());
}

#[tokio::test]
async fn pipeline_cannot_start_twice_or_stop_before_start() {
    let (mut sync, _api) = build(StaticDocker::new(Vec::new()));

    assert!(sync.stop().await.is_err());
    sync.start().await.unwrap();
    assert!(sync.start().await.is_err());
    sync.stop().await.unwrap();

    // the source and engine were consumed by the first start
    assert!(sync.start().await.is_err());
}

#[tokio::test]
async fn not_started_pipeline_is_unhealthy() {
    let (sync, _api) = build(StaticDocker::new(Vec::new()));
    assert_eq!(
        sync.health_check().await,
        HealthStatus::Unhealthy("not started".to_owned())
    );
}

#[test]
fn builder_requires_clients() {
    let result = LabelSyncBuilder::<StaticDocker, MockProxyApi>::new()
        .proxy_api(Arc::new(MockProxyApi::new()))
        .build();
    assert!(matches!(result, Err(SyncError::Build { ref field, .. }) if field == "docker_client"));

    let result = LabelSyncBuilder::<StaticDocker, MockProxyApi>::new()
        .docker_client(Arc::new(StaticDocker::new(Vec::new())))
        .build();
    assert!(matches!(result, Err(SyncError::Build { ref field, .. }) if field == "proxy_api"));
}

#[test]
fn builder_rejects_zero_retry_interval() {
    let mut config = AgentConfig::default();
    config.sync.retry_interval_secs = 0;
    let result = LabelSyncBuilder::new()
        .config(&config)
        .docker_client(Arc::new(StaticDocker::new(Vec::new())))
        .proxy_api(Arc::new(MockProxyApi::new()))
        .build();
    assert!(result.is_err());
}
