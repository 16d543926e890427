//! Shared fixtures for daemon integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;

use labelsync_core::config::AgentConfig;
use labelsync_core::types::{ContainerSnapshot, PortMapping};
use labelsync_docker::{DockerClient, DockerWatchError, EventStream};
use labelsync_npm::{NpmError, ProxyApi, ProxyHostRequest, RemoteId, RemoteProxyHost};
use labelsync_reconciler::StatusHandle;

/// Docker client with a fixed set of running containers and no live events.
pub struct StaticDocker {
    containers: Vec<ContainerSnapshot>,
}

impl StaticDocker {
    pub fn new(containers: Vec<ContainerSnapshot>) -> Self {
        Self { containers }
    }
}

impl DockerClient for StaticDocker {
    async fn list_running(&self) -> Result<Vec<String>, DockerWatchError> {
        Ok(self.containers.iter().map(|c| c.id.clone()).collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerSnapshot, DockerWatchError> {
        self.containers
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| DockerWatchError::ContainerNotFound(id.to_owned()))
    }

    async fn subscribe(&self) -> Result<EventStream, DockerWatchError> {
        Ok(futures::stream::pending().boxed())
    }

    async fn ping(&self) -> Result<(), DockerWatchError> {
        Ok(())
    }
}

/// Proxy manager stub that accepts every write.
#[derive(Default)]
pub struct AcceptingApi {
    next_id: AtomicU64,
    created: Mutex<Vec<ProxyHostRequest>>,
}

impl AcceptingApi {
    pub fn created(&self) -> Vec<ProxyHostRequest> {
        self.created.lock().unwrap().clone()
    }
}

impl ProxyApi for AcceptingApi {
    async fn ensure_authenticated(&self) -> Result<(), NpmError> {
        Ok(())
    }

    async fn create_proxy_host(&self, request: &ProxyHostRequest) -> Result<RemoteId, NpmError> {
        self.created.lock().unwrap().push(request.clone());
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn update_proxy_host(
        &self,
        _id: RemoteId,
        _request: &ProxyHostRequest,
    ) -> Result<(), NpmError> {
        Ok(())
    }

    async fn delete_proxy_host(&self, _id: RemoteId) -> Result<(), NpmError> {
        Ok(())
    }

    async fn list_proxy_hosts(&self) -> Result<Vec<RemoteProxyHost>, NpmError> {
        Ok(Vec::new())
    }
}

/// Labelled container reachable through the gateway on host port 8089.
pub fn web_container() -> ContainerSnapshot {
    ContainerSnapshot {
        id: "c0ffee".to_owned(),
        name: "web".to_owned(),
        labels: HashMap::from([
            ("npm.proxy.host".to_owned(), "app.test".to_owned()),
            ("npm.proxy.port".to_owned(), "80".to_owned()),
            ("npm.proxy.ssl".to_owned(), "false".to_owned()),
        ]),
        ports: vec![PortMapping::tcp(80, Some(8089))],
        gateway_ip: Some("172.17.0.1".to_owned()),
        container_ip: Some("172.17.0.2".to_owned()),
    }
}

/// Valid configuration without sockets.
pub fn test_config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.npm.base_url = "http://npm.internal:81".to_owned();
    config.npm.identity = "admin@example.com".to_owned();
    config.npm.secret = "changeme".to_owned();
    config.status.enabled = false;
    config.metrics.enabled = false;
    config
}

/// Waits until the snapshot reports `expected` synced containers.
pub async fn wait_for_synced(status: &mut StatusHandle, expected: usize) {
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

/// Polls `check` every 10ms for up to five seconds.
pub async fn eventually(mut check: impl FnMut() -> bool, what: &str) {
    let done = tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(done.is_ok(), "timed out waiting for {what}");
}
