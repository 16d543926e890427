//! 컨테이너 이벤트 소스 -- 초기 열거, 생명주기 구독, 재연결 관리
//!
//! [`ContainerEventSource`]는 런타임에 연결할 때마다 다음 순서로 동작합니다.
//!
//! ```text
//! ping ──> subscribe ──> list + inspect ──> Seen* ──> EnumerationComplete
//!                                                          |
//!                                 start ──> inspect ──> Seen
//!                      stop/die/destroy ──────────────> Removed
//! ```
//!
//! 구독을 열거보다 먼저 열어 두므로 열거 도중 발생한 이벤트도 스트림에 남습니다.
//! 연결이 끊기면 지수 백오프로 재연결하고, 재연결 후 전체 열거를 다시 수행합니다.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use labelsync_core::metrics as m;

use crate::docker::DockerClient;
use crate::error::DockerWatchError;
use crate::event::{ContainerEvent, LifecycleEvent};

/// Exponential reconnect delay, doubling from `base` up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Creates a backoff starting at `base` and capped at `max`.
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.min(max);
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Returns the delay to wait now and doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Resets the delay after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

/// 런타임 연결 상태 핸들 (health check 용)
#[derive(Debug, Clone, Default)]
pub struct RuntimeStatus {
    connected: Arc<AtomicBool>,
}

impl RuntimeStatus {
    /// 현재 런타임 이벤트 스트림에 연결되어 있는지 반환합니다.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }
}

/// 세션 종료 사유
enum SessionEnd {
    /// 취소되었거나 수신 측이 닫힘 -- 소스 종료
    Finished,
    /// 연결 끊김 -- 재연결 필요
    Disconnected(DockerWatchError),
}

impl From<DockerWatchError> for SessionEnd {
    fn from(err: DockerWatchError) -> Self {
        Self::Disconnected(err)
    }
}

/// Produces [`ContainerEvent`]s for the reconciliation engine.
///
/// # 사용 예시
/// ```ignore
/// let docker = Arc::new(BollardDockerClient::connect("")?);
/// let source = ContainerEventSource::new(docker, Backoff::new(base, max));
/// let status = source.status();
/// let handle = source.spawn(event_tx, cancel.child_token());
/// ```
pub struct ContainerEventSource<D: DockerClient> {
    docker: Arc<D>,
    backoff: Backoff,
    status: RuntimeStatus,
}

impl<D: DockerClient> ContainerEventSource<D> {
    /// 새 이벤트 소스를 생성합니다.
    pub fn new(docker: Arc<D>, backoff: Backoff) -> Self {
        Self {
            docker,
            backoff,
            status: RuntimeStatus::default(),
        }
    }

    /// 연결 상태 핸들을 반환합니다.
    pub fn status(&self) -> RuntimeStatus {
        self.status.clone()
    }

    /// 백그라운드 태스크로 실행합니다.
    pub fn spawn(
        self,
        tx: mpsc::Sender<ContainerEvent>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(tx, cancel))
    }

    /// Runs until `cancel` fires or the receiver is dropped.
    ///
    /// Runtime outages are never fatal: every lost connection is retried
    /// after the current backoff delay.
    pub async fn run(mut self, tx: mpsc::Sender<ContainerEvent>, cancel: CancellationToken) {
        info!("container event source started");

        loop {
            if cancel.is_cancelled() || tx.is_closed() {
                break;
            }

            match self.run_session(&tx, &cancel).await {
                SessionEnd::Finished => break,
                SessionEnd::Disconnected(err) => {
                    self.status.set_connected(false);
                    metrics::counter!(m::RUNTIME_RECONNECTS_TOTAL).increment(1);

                    let delay = self.backoff.next_delay();
                    warn!(
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "container runtime unavailable, reconnecting"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.status.set_connected(false);
        info!("container event source stopped");
    }

    async fn run_session(
        &mut self,
        tx: &mpsc::Sender<ContainerEvent>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        match self.session(tx, cancel).await {
            Ok(end) => end,
            Err(err) => SessionEnd::Disconnected(err),
        }
    }

    async fn session(
        &mut self,
        tx: &mpsc::Sender<ContainerEvent>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, DockerWatchError> {
        self.docker.ping().await?;
        let mut stream = self.docker.subscribe().await?;

        // 1. 전체 열거
        let ids = self.docker.list_running().await?;
        let mut running = HashSet::with_capacity(ids.len());
        for id in ids {
            match self.docker.inspect_container(&id).await {
                Ok(snapshot) => {
                    running.insert(id);
                    if tx.send(ContainerEvent::Seen(snapshot)).await.is_err() {
                        return Ok(SessionEnd::Finished);
                    }
                }
                Err(DockerWatchError::ContainerNotFound(_)) => {
                    debug!(container_id = %id, "container vanished during enumeration");
                }
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => {
                    warn!(container_id = %id, error = %e, "failed to inspect container, skipping");
                }
            }
        }

        let count = running.len();
        self.backoff.reset();
        self.status.set_connected(true);
        if tx
            .send(ContainerEvent::EnumerationComplete { running })
            .await
            .is_err()
        {
            return Ok(SessionEnd::Finished);
        }
        info!(containers = count, "container enumeration complete");

        // 2. 생명주기 이벤트 처리
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(SessionEnd::Finished),
                item = stream.next() => item,
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(DockerWatchError::RuntimeUnavailable(
                        "event stream ended".to_owned(),
                    ));
                }
            };

            metrics::counter!(m::RUNTIME_EVENTS_TOTAL, m::LABEL_OPERATION => event.action.as_str())
                .increment(1);

            let Some(out) = self.translate(event).await? else {
                continue;
            };
            debug!(event = %out, "emitting container event");
            if tx.send(out).await.is_err() {
                return Ok(SessionEnd::Finished);
            }
        }
    }

    /// Maps a lifecycle event to the downstream event, inspecting on `start`.
    async fn translate(
        &self,
        event: LifecycleEvent,
    ) -> Result<Option<ContainerEvent>, DockerWatchError> {
        let LifecycleEvent {
            container_id,
            action,
        } = event;

        if action.is_removal() {
            return Ok(Some(ContainerEvent::Removed { container_id }));
        }

        match self.docker.inspect_container(&container_id).await {
            Ok(snapshot) => Ok(Some(ContainerEvent::Seen(snapshot))),
            // 시작 직후 사라진 컨테이너
            Err(DockerWatchError::ContainerNotFound(_)) => {
                Ok(Some(ContainerEvent::Removed { container_id }))
            }
            Err(e) if e.is_unavailable() => Err(e),
            Err(e) => {
                warn!(container_id = %container_id, error = %e, "failed to inspect started container");
                Ok(None)
            }
        }
    }
}
