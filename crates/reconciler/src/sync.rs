//! 레이블 동기화 파이프라인 -- 이벤트 소스와 조정 엔진의 조립 및 생명주기 관리
//!
//! [`LabelSync`]는 core의 [`Pipeline`] trait을 구현하여
//! `labelsync-daemon`에서 start/stop/health_check 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! DockerClient ──> ContainerEventSource ──mpsc──> ReconciliationEngine ──> ProxyApi
//!                        |                                 |
//!                  RuntimeStatus                      StatusHandle
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use labelsync_core::config::AgentConfig;
use labelsync_core::error::{AgentError, PipelineError};
use labelsync_core::pipeline::{HealthStatus, Pipeline};
use labelsync_docker::{Backoff, ContainerEventSource, DockerClient, RuntimeStatus};
use labelsync_npm::ProxyApi;

use crate::engine::ReconciliationEngine;
use crate::error::SyncError;
use crate::labels::DecodeDefaults;
use crate::status::StatusHandle;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// Health derived from the engine task and the runtime connection.
pub fn evaluate_health(engine_alive: bool, runtime_connected: bool) -> HealthStatus {
    if !engine_alive {
        HealthStatus::Unhealthy("reconciliation engine stopped".to_owned())
    } else if !runtime_connected {
        HealthStatus::Degraded("container runtime unreachable, reconnecting".to_owned())
    } else {
        HealthStatus::Healthy
    }
}

/// 레이블 동기화 파이프라인
///
/// # 사용 예시
/// ```ignore
/// let mut sync = LabelSyncBuilder::new()
///     .config(&config)
///     .docker_client(docker)
///     .proxy_api(api)
///     .build()?;
///
/// let status = sync.status_handle();
/// sync.start().await?;
/// ```
pub struct LabelSync<D: DockerClient, P: ProxyApi> {
    state: RunState,
    docker: Arc<D>,
    api: Arc<P>,
    channel_capacity: usize,
    /// start()에서 소비됨
    source: Option<ContainerEventSource<D>>,
    /// start()에서 소비됨
    engine: Option<ReconciliationEngine<P>>,
    runtime: RuntimeStatus,
    status: StatusHandle,
    cancel: CancellationToken,
    source_task: Option<JoinHandle<()>>,
    engine_task: Option<JoinHandle<()>>,
}

impl<D: DockerClient, P: ProxyApi> LabelSync<D, P> {
    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &'static str {
        match self.state {
            RunState::Initialized => "initialized",
            RunState::Running => "running",
            RunState::Stopped => "stopped",
        }
    }

    /// 상태 스냅샷 핸들을 반환합니다.
    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    /// 런타임 연결 상태 핸들을 반환합니다.
    pub fn runtime_status(&self) -> RuntimeStatus {
        self.runtime.clone()
    }

    fn engine_alive(&self) -> bool {
        self.engine_task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl<D: DockerClient, P: ProxyApi> Pipeline for LabelSync<D, P> {
    async fn start(&mut self) -> Result<(), AgentError> {
        if self.state == RunState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!("starting label sync");

        // 1. 연결 확인 (실패해도 계속 진행 -- 소스와 엔진이 재시도함)
        if let Err(e) = self.docker.ping().await {
            warn!(error = %e, "container runtime not available, will keep retrying");
        }
        if let Err(e) = self.api.ensure_authenticated().await {
            warn!(error = %e, "proxy manager authentication failed, will retry on first sync");
        }

        // 2. 소스와 엔진 태스크 스폰
        let (source, engine) = match (self.source.take(), self.engine.take()) {
            (Some(source), Some(engine)) => (source, engine),
            _ => {
                return Err(PipelineError::InitFailed(
                    "event source already consumed by a previous start, rebuild the pipeline to restart"
                        .to_owned(),
                )
                .into());
            }
        };

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        self.source_task = Some(source.spawn(tx, self.cancel.child_token()));
        self.engine_task = Some(engine.spawn(rx, self.cancel.child_token()));

        self.state = RunState::Running;
        info!("label sync started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AgentError> {
        if self.state != RunState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping label sync");
        self.cancel.cancel();

        // 진행 중인 원격 호출은 끝까지 실행되도록 abort 대신 완료를 기다림
        for task in [self.source_task.take(), self.engine_task.take()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = task.await {
                warn!(error = %e, "label sync task ended abnormally");
            }
        }

        self.state = RunState::Stopped;
        info!("label sync stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            RunState::Running => evaluate_health(self.engine_alive(), self.runtime.is_connected()),
            RunState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            RunState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 레이블 동기화 파이프라인 빌더
pub struct LabelSyncBuilder<D: DockerClient, P: ProxyApi> {
    config: AgentConfig,
    docker: Option<Arc<D>>,
    api: Option<Arc<P>>,
}

impl<D: DockerClient, P: ProxyApi> LabelSyncBuilder<D, P> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: AgentConfig::default(),
            docker: None,
            api: None,
        }
    }

    /// 에이전트 설정을 지정합니다.
    pub fn config(mut self, config: &AgentConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Docker 클라이언트를 설정합니다.
    pub fn docker_client(mut self, docker: Arc<D>) -> Self {
        self.docker = Some(docker);
        self
    }

    /// 프록시 API 클라이언트를 설정합니다.
    pub fn proxy_api(mut self, api: Arc<P>) -> Self {
        self.api = Some(api);
        self
    }

    /// 파이프라인을 빌드합니다.
    pub fn build(self) -> Result<LabelSync<D, P>, SyncError> {
        let docker = self.docker.ok_or_else(|| SyncError::Build {
            field: "docker_client".to_owned(),
            reason: "docker client must be provided".to_owned(),
        })?;
        let api = self.api.ok_or_else(|| SyncError::Build {
            field: "proxy_api".to_owned(),
            reason: "proxy api client must be provided".to_owned(),
        })?;

        let sync = &self.config.sync;
        if sync.retry_interval_secs == 0 {
            return Err(SyncError::Build {
                field: "sync.retry_interval_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if sync.event_channel_capacity == 0 {
            return Err(SyncError::Build {
                field: "sync.event_channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        let backoff = Backoff::new(
            Duration::from_millis(self.config.docker.reconnect_base_ms),
            Duration::from_secs(self.config.docker.reconnect_max_secs),
        );
        let source = ContainerEventSource::new(Arc::clone(&docker), backoff);
        let runtime = source.status();

        let (engine, status) = ReconciliationEngine::new(
            Arc::clone(&api),
            DecodeDefaults::from_config(&self.config),
            Duration::from_secs(sync.retry_interval_secs),
        );

        Ok(LabelSync {
            state: RunState::Initialized,
            docker,
            api,
            channel_capacity: sync.event_channel_capacity,
            source: Some(source),
            engine: Some(engine),
            runtime,
            status,
            cancel: CancellationToken::new(),
            source_task: None,
            engine_task: None,
        })
    }
}

impl<D: DockerClient, P: ProxyApi> Default for LabelSyncBuilder<D, P> {
    fn default() -> Self {
        Self::new()
    }
}
