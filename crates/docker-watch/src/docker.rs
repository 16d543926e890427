//! Docker API abstraction for testability.
//!
//! The [`DockerClient`] trait abstracts the bollard Docker API, allowing
//! production code to use [`BollardDockerClient`] while tests use `MockDockerClient`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ ContainerEventSource │
//! └──────────┬───────────┘
//!            │
//!            ▼
//!     ┌─────────────┐
//!     │DockerClient │ (trait)
//!     └─────────────┘
//!        │       │
//!        ▼       ▼
//!   ┌───────┐ ┌──────┐
//!   │Bollard│ │ Mock │
//!   └───┬───┘ └──────┘
//!       │
//!       ▼
//!   Docker Daemon
//! ```
//!
//! # Container ID Validation
//!
//! `inspect_container` validates ids before calling the daemon:
//! - Must be 1-64 characters
//! - Must contain only ASCII hex digits ([0-9a-fA-F])

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;

use labelsync_core::types::{ContainerSnapshot, PortMapping};

use crate::error::DockerWatchError;
use crate::event::{LifecycleAction, LifecycleEvent};

/// Request timeout handed to bollard, in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Boxed lifecycle event stream returned by [`DockerClient::subscribe`].
///
/// The stream ending, or yielding an error, means the runtime connection was lost.
pub type EventStream = BoxStream<'static, Result<LifecycleEvent, DockerWatchError>>;

/// Validates a container ID to prevent injection attacks.
fn validate_container_id(id: &str) -> Result<(), DockerWatchError> {
    if id.is_empty() || id.len() > 64 {
        return Err(DockerWatchError::DockerApi(format!(
            "invalid container ID: length {} (must be 1-64)",
            id.len()
        )));
    }
    if !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DockerWatchError::DockerApi(
            "invalid container ID: contains non-hex characters".to_owned(),
        ));
    }
    Ok(())
}

/// Trait abstracting the read-only Docker API operations the agent needs.
///
/// The trait is `Send + Sync + 'static`, allowing safe sharing across async contexts.
///
/// # Error Handling
///
/// - **404 errors**: Converted to `DockerWatchError::ContainerNotFound`
/// - **Connection errors**: Wrapped as `DockerWatchError::RuntimeUnavailable`
/// - **Other daemon errors**: Wrapped as `DockerWatchError::DockerApi`
pub trait DockerClient: Send + Sync + 'static {
    /// Lists the ids of running containers.
    fn list_running(
        &self,
    ) -> impl Future<Output = Result<Vec<String>, DockerWatchError>> + Send;

    /// Inspects a container and returns its labels, ports and network addresses.
    ///
    /// # Errors
    ///
    /// - `DockerWatchError::ContainerNotFound`: Container does not exist (404)
    /// - `DockerWatchError::DockerApi`: Invalid ID or other API errors
    fn inspect_container(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ContainerSnapshot, DockerWatchError>> + Send;

    /// Subscribes to container start/stop/die/destroy events.
    fn subscribe(&self) -> impl Future<Output = Result<EventStream, DockerWatchError>> + Send;

    /// Checks Docker daemon connectivity.
    ///
    /// # Errors
    ///
    /// Returns `DockerWatchError::RuntimeUnavailable` if the daemon is unreachable.
    fn ping(&self) -> impl Future<Output = Result<(), DockerWatchError>> + Send;
}

/// Production Docker client implementation using `bollard`.
///
/// Communicates with the Docker daemon via a Unix socket or TCP connection.
/// Internally uses `Arc<bollard::Docker>` for safe sharing across async tasks.
///
/// # Examples
///
/// ```ignore
/// use labelsync_docker::BollardDockerClient;
///
/// // Local defaults (honours the platform socket)
/// let client = BollardDockerClient::connect("")?;
///
/// // Remote daemon
/// let client = BollardDockerClient::connect("tcp://10.0.0.5:2375")?;
/// # Ok::<(), labelsync_docker::DockerWatchError>(())
/// ```
pub struct BollardDockerClient {
    docker: Arc<bollard::Docker>,
}

impl BollardDockerClient {
    /// Connects to Docker at `endpoint`.
    ///
    /// - empty: platform local defaults
    /// - `unix:///path` or a bare path: Unix socket
    /// - `tcp://host:port` or `http://host:port`: plain HTTP
    ///
    /// # Errors
    ///
    /// Returns `DockerWatchError::RuntimeUnavailable` if the client cannot be built.
    pub fn connect(endpoint: &str) -> Result<Self, DockerWatchError> {
        let endpoint = endpoint.trim();
        let docker = if endpoint.is_empty() {
            bollard::Docker::connect_with_local_defaults()
        } else if endpoint.starts_with("tcp://") || endpoint.starts_with("http://") {
            bollard::Docker::connect_with_http(
                endpoint,
                CONNECT_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            )
        } else {
            let path = endpoint.strip_prefix("unix://").unwrap_or(endpoint);
            bollard::Docker::connect_with_socket(
                path,
                CONNECT_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            )
        }
        .map_err(|e| {
            DockerWatchError::RuntimeUnavailable(format!(
                "failed to connect to docker at '{endpoint}': {e}"
            ))
        })?;

        Ok(Self {
            docker: Arc::new(docker),
        })
    }
}

impl DockerClient for BollardDockerClient {
    async fn list_running(&self) -> Result<Vec<String>, DockerWatchError> {
        use bollard::container::ListContainersOptions;

        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| map_bollard_error(e, "list containers"))?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerSnapshot, DockerWatchError> {
        use bollard::container::InspectContainerOptions;

        validate_container_id(id)?;

        let details = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => DockerWatchError::ContainerNotFound(id.to_owned()),
                other => map_bollard_error(other, "inspect container"),
            })?;

        Ok(snapshot_from_inspect(details))
    }

    async fn subscribe(&self) -> Result<EventStream, DockerWatchError> {
        use bollard::system::EventsOptions;

        let filters = HashMap::from([
            ("type".to_owned(), vec!["container".to_owned()]),
            (
                "event".to_owned(),
                LifecycleAction::ALL
                    .iter()
                    .map(|a| a.as_str().to_owned())
                    .collect(),
            ),
        ]);

        let stream = self
            .docker
            .events(Some(EventsOptions::<String> {
                filters,
                ..Default::default()
            }))
            .filter_map(|item| async move {
                match item {
                    Ok(message) => event_from_message(message).map(Ok),
                    Err(e) => Some(Err(DockerWatchError::RuntimeUnavailable(format!(
                        "event stream error: {e}"
                    )))),
                }
            })
            .boxed();

        Ok(stream)
    }

    async fn ping(&self) -> Result<(), DockerWatchError> {
        self.docker
            .ping()
            .await
            .map_err(|e| DockerWatchError::RuntimeUnavailable(format!("ping failed: {e}")))?;
        Ok(())
    }
}

fn map_bollard_error(err: bollard::errors::Error, context: &str) -> DockerWatchError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => DockerWatchError::DockerApi(format!("{context} failed ({status_code}): {message}")),
        other => DockerWatchError::RuntimeUnavailable(format!("{context} failed: {other}")),
    }
}

/// Converts a runtime event message into a lifecycle event.
///
/// Non-container events and actions outside [`LifecycleAction::ALL`] are dropped.
fn event_from_message(message: bollard::models::EventMessage) -> Option<LifecycleEvent> {
    use bollard::models::EventMessageTypeEnum;

    if let Some(typ) = message.typ {
        if typ != EventMessageTypeEnum::CONTAINER {
            return None;
        }
    }
    let action = message.action?.parse::<LifecycleAction>().ok()?;
    let container_id = message.actor?.id?;
    if container_id.is_empty() {
        return None;
    }
    Some(LifecycleEvent::new(container_id, action))
}

/// Flattens an inspect response into the fields the agent consumes.
///
/// Network addresses come from the alphabetically first network that has a
/// container IP assigned.
fn snapshot_from_inspect(details: bollard::models::ContainerInspectResponse) -> ContainerSnapshot {
    let id = details.id.unwrap_or_default();
    let name = details
        .name
        .map(|n| n.trim_start_matches('/').to_owned())
        .unwrap_or_default();
    let labels = details
        .config
        .and_then(|c| c.labels)
        .unwrap_or_default();

    let mut ports = Vec::new();
    let mut gateway_ip = None;
    let mut container_ip = None;

    if let Some(settings) = details.network_settings {
        if let Some(port_map) = settings.ports {
            for (key, bindings) in port_map {
                let Some((port, protocol)) = parse_port_key(&key) else {
                    continue;
                };
                let host_port = bindings.unwrap_or_default().into_iter().find_map(|b| {
                    b.host_port
                        .as_deref()
                        .and_then(|p| p.parse::<u16>().ok())
                });
                ports.push(PortMapping {
                    container_port: port,
                    protocol,
                    host_port,
                });
            }
        }

        if let Some(networks) = settings.networks {
            let mut names: Vec<_> = networks.keys().cloned().collect();
            names.sort();
            for name in names {
                let Some(endpoint) = networks.get(&name) else {
                    continue;
                };
                let ip = endpoint.ip_address.clone().filter(|ip| !ip.is_empty());
                if ip.is_some() {
                    container_ip = ip;
                    gateway_ip = endpoint.gateway.clone().filter(|gw| !gw.is_empty());
                    break;
                }
            }
        }
    }

    ports.sort_by(|a, b| {
        a.container_port
            .cmp(&b.container_port)
            .then_with(|| a.protocol.cmp(&b.protocol))
    });

    ContainerSnapshot {
        id,
        name,
        labels,
        ports,
        gateway_ip,
        container_ip,
    }
}

/// Parses a Docker port key such as `80/tcp`.
fn parse_port_key(key: &str) -> Option<(u16, String)> {
    let (port, protocol) = key.split_once('/').unwrap_or((key, "tcp"));
    Some((port.parse().ok()?, protocol.to_owned()))
}

/// 테스트용 Mock Docker 클라이언트
///
/// 구독할 때마다 미리 준비된 이벤트 세션을 하나씩 꺼내 스트림으로 반환합니다.
/// 세션 이벤트가 끝나면 스트림이 종료되어 연결 끊김을 시뮬레이션합니다.
/// 준비된 세션이 없으면 영원히 대기하는 스트림을 반환합니다.
#[cfg(test)]
#[derive(Default)]
pub struct MockDockerClient {
    /// 실행 중인 컨테이너 (ID -> 스냅샷)
    pub containers: std::sync::Mutex<HashMap<String, ContainerSnapshot>>,
    /// 구독 세션별 이벤트 목록
    pub sessions: std::sync::Mutex<std::collections::VecDeque<Vec<Result<LifecycleEvent, DockerWatchError>>>>,
    /// ping이 실패할 남은 횟수
    pub ping_failures: std::sync::atomic::AtomicU32,
    /// subscribe 호출 횟수
    pub subscribe_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockDockerClient {
    /// 빈 mock 클라이언트를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 실행 중인 컨테이너를 추가합니다.
    pub fn with_container(self, snapshot: ContainerSnapshot) -> Self {
        self.add_container(snapshot);
        self
    }

    /// 구독 세션을 추가합니다.
    pub fn with_session(self, events: Vec<Result<LifecycleEvent, DockerWatchError>>) -> Self {
        self.sessions.lock().unwrap().push_back(events);
        self
    }

    /// 처음 `n`번의 ping이 실패하도록 설정합니다.
    pub fn with_ping_failures(self, n: u32) -> Self {
        self.ping_failures
            .store(n, std::sync::atomic::Ordering::SeqCst);
        self
    }

    /// 컨테이너를 추가합니다.
    pub fn add_container(&self, snapshot: ContainerSnapshot) {
        self.containers
            .lock()
            .unwrap()
            .insert(snapshot.id.clone(), snapshot);
    }

    /// 컨테이너를 제거합니다.
    pub fn remove_container(&self, id: &str) {
        self.containers.lock().unwrap().remove(id);
    }
}

#[cfg(test)]
impl DockerClient for MockDockerClient {
    async fn list_running(&self) -> Result<Vec<String>, DockerWatchError> {
        let mut ids: Vec<String> = self.containers.lock().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerSnapshot, DockerWatchError> {
        self.containers
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| DockerWatchError::ContainerNotFound(id.to_owned()))
    }

    async fn subscribe(&self) -> Result<EventStream, DockerWatchError> {
        self.subscribe_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let next = self.sessions.lock().unwrap().pop_front();
        Ok(match next {
            Some(events) => futures::stream::iter(events).boxed(),
            None => futures::stream::pending().boxed(),
        })
    }

    async fn ping(&self) -> Result<(), DockerWatchError> {
        use std::sync::atomic::Ordering;

        let remaining = self.ping_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.ping_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DockerWatchError::RuntimeUnavailable(
                "mock daemon down".to_owned(),
            ));
        }
        Ok(())
    }
}
