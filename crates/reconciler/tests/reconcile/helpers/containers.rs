//! Container snapshot factories and engine setup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use labelsync_core::types::{ContainerSnapshot, PortMapping};
use labelsync_reconciler::{DecodeDefaults, ReconciliationEngine, StatusHandle};

use super::mock_api::MockProxyApi;

/// Snapshot with the given labels and no network data.
pub fn container(id: &str, labels: &[(&str, &str)]) -> ContainerSnapshot {
    ContainerSnapshot {
        id: id.to_owned(),
        name: format!("c-{id}"),
        labels: labels
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>(),
        ..Default::default()
    }
}

/// `host=app.test, port=80`, mapping `80 -> 8089`, gateway `172.17.0.1`.
pub fn container_a() -> ContainerSnapshot {
    ContainerSnapshot {
        ports: vec![PortMapping::tcp(80, Some(8089))],
        gateway_ip: Some("172.17.0.1".to_owned()),
        container_ip: Some("172.17.0.2".to_owned()),
        ..container(
            "aaaa",
            &[("npm.proxy.host", "app.test"), ("npm.proxy.port", "80"), ("npm.proxy.ssl", "false")],
        )
    }
}

/// `host=b.test, port=9000`, no mapping, container IP `172.18.0.5`.
pub fn container_b() -> ContainerSnapshot {
    ContainerSnapshot {
        gateway_ip: Some("172.18.0.1".to_owned()),
        container_ip: Some("172.18.0.5".to_owned()),
        ..container(
            "bbbb",
            &[("npm.proxy.host", "b.test"), ("npm.proxy.port", "9000"), ("npm.proxy.ssl", "false")],
        )
    }
}

/// Reachable container with arbitrary host labels.
pub fn labelled(id: &str, hosts: &str) -> ContainerSnapshot {
    ContainerSnapshot {
        container_ip: Some("172.20.0.9".to_owned()),
        ..container(id, &[("npm.proxy.host", hosts), ("npm.proxy.ssl", "false")])
    }
}

pub fn defaults() -> DecodeDefaults {
    DecodeDefaults {
        label_prefix: "npm.proxy.".to_owned(),
        forward_host: None,
        letsencrypt_email: Some("ops@example.com".to_owned()),
    }
}

/// Engine over a fresh mock API.
pub fn engine() -> (
    ReconciliationEngine<MockProxyApi>,
    StatusHandle,
    Arc<MockProxyApi>,
) {
    engine_with(MockProxyApi::new())
}

/// Engine over a prepared mock API.
pub fn engine_with(
    api: MockProxyApi,
) -> (
    ReconciliationEngine<MockProxyApi>,
    StatusHandle,
    Arc<MockProxyApi>,
) {
    let api = Arc::new(api);
    let (engine, status) =
        ReconciliationEngine::new(Arc::clone(&api), defaults(), Duration::from_secs(30));
    (engine, status, api)
}
