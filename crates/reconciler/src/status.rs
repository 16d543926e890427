//! Read-only status snapshots of the reconciliation table.
//!
//! The engine publishes a fresh [`StatusSnapshot`] through a `watch` channel
//! after every change. Readers clone the `Arc` and never block the engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Per-container sync state as shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    /// 원격 반영 대기
    Pending,
    /// 원격 상태와 일치
    Synced,
    /// 마지막 원격 작업 실패 (재시도 예정)
    Failed,
    /// 삭제 재시도 대기
    Removing,
}

/// One managed container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerStatus {
    /// 런타임 컨테이너 ID
    pub container_id: String,
    /// 컨테이너 이름
    pub name: String,
    /// 레이블에 선언된 도메인 목록
    pub domains: Vec<String>,
    /// `scheme://host:port`
    pub upstream: String,
    /// 인증서 발급 요청 여부
    pub ssl: bool,
    /// 원격 proxy host ID (아직 생성 전이면 없음)
    pub remote_id: Option<u64>,
    /// 동기화 단계
    pub state: SyncPhase,
    /// 마지막 원격 작업 실패 사유
    pub last_error: Option<String>,
}

/// Consistent view of the whole table at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// 스냅샷 생성 시각
    pub generated_at: DateTime<Utc>,
    /// 관리 중인 컨테이너 수
    pub managed: usize,
    /// `Synced` 상태인 컨테이너 수
    pub synced: usize,
    /// `Failed` 또는 `Removing` 상태인 컨테이너 수
    pub failed: usize,
    /// 첫 번째 도메인 순으로 정렬된 항목
    pub containers: Vec<ContainerStatus>,
}

impl StatusSnapshot {
    /// Builds a snapshot, sorting entries by first domain.
    pub fn new(mut containers: Vec<ContainerStatus>) -> Self {
        containers.sort_by(|a, b| {
            a.domains
                .first()
                .cmp(&b.domains.first())
                .then_with(|| a.container_id.cmp(&b.container_id))
        });
        let synced = containers
            .iter()
            .filter(|c| c.state == SyncPhase::Synced)
            .count();
        let failed = containers
            .iter()
            .filter(|c| matches!(c.state, SyncPhase::Failed | SyncPhase::Removing))
            .count();
        Self {
            generated_at: Utc::now(),
            managed: containers.len(),
            synced,
            failed,
            containers,
        }
    }

    /// 빈 스냅샷
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

/// Cloneable reader for the latest snapshot.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    rx: watch::Receiver<Arc<StatusSnapshot>>,
}

impl StatusHandle {
    pub(crate) fn new(rx: watch::Receiver<Arc<StatusSnapshot>>) -> Self {
        Self { rx }
    }

    /// Latest published snapshot.
    pub fn current(&self) -> Arc<StatusSnapshot> {
        Arc::clone(&self.rx.borrow())
    }

    /// Whether the engine that publishes snapshots has gone away.
    pub fn is_closed(&self) -> bool {
        self.rx.has_changed().is_err()
    }

    /// Waits for the next published snapshot.
    pub async fn changed(&mut self) -> Option<Arc<StatusSnapshot>> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }
}

/// 스냅샷 채널을 생성합니다.
pub(crate) fn channel() -> (watch::Sender<Arc<StatusSnapshot>>, StatusHandle) {
    let (tx, rx) = watch::channel(Arc::new(StatusSnapshot::empty()));
    (tx, StatusHandle::new(rx))
}
