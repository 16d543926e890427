//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `labelsync_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 원격 작업 레이블 키 (create, update, delete, list)
pub const LABEL_OPERATION: &str = "operation";

// ─── Sync 메트릭 ───────────────────────────────────────────────────

/// 관리 중인 컨테이너 수 (gauge)
pub const SYNC_MANAGED_CONTAINERS: &str = "labelsync_managed_containers";

/// 생성된 프록시 호스트 수 (counter)
pub const SYNC_PROXY_HOSTS_CREATED_TOTAL: &str = "labelsync_proxy_hosts_created_total";

/// 갱신된 프록시 호스트 수 (counter)
pub const SYNC_PROXY_HOSTS_UPDATED_TOTAL: &str = "labelsync_proxy_hosts_updated_total";

/// 삭제된 프록시 호스트 수 (counter)
pub const SYNC_PROXY_HOSTS_DELETED_TOTAL: &str = "labelsync_proxy_hosts_deleted_total";

/// 실패한 원격 작업 수 (counter, label: operation)
pub const SYNC_FAILURES_TOTAL: &str = "labelsync_sync_failures_total";

/// 시작 시 정리된 고아 프록시 호스트 수 (counter)
pub const SYNC_ORPHANS_REMOVED_TOTAL: &str = "labelsync_orphans_removed_total";

// ─── Runtime 메트릭 ────────────────────────────────────────────────

/// 런타임 이벤트 스트림 재연결 수 (counter)
pub const RUNTIME_RECONNECTS_TOTAL: &str = "labelsync_runtime_reconnects_total";

/// 수신한 런타임 이벤트 수 (counter)
pub const RUNTIME_EVENTS_TOTAL: &str = "labelsync_runtime_events_total";

// ─── API 클라이언트 메트릭 ──────────────────────────────────────────

/// 재인증 횟수 (counter)
pub const NPM_REAUTHENTICATIONS_TOTAL: &str = "labelsync_npm_reauthentications_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_gauge!(
        SYNC_MANAGED_CONTAINERS,
        "Number of containers currently tracked by the reconciliation engine"
    );
    describe_counter!(
        SYNC_PROXY_HOSTS_CREATED_TOTAL,
        "Total number of proxy hosts created in the proxy manager"
    );
    describe_counter!(
        SYNC_PROXY_HOSTS_UPDATED_TOTAL,
        "Total number of proxy hosts updated in the proxy manager"
    );
    describe_counter!(
        SYNC_PROXY_HOSTS_DELETED_TOTAL,
        "Total number of proxy hosts deleted from the proxy manager"
    );
    describe_counter!(
        SYNC_FAILURES_TOTAL,
        "Total number of failed remote operations by operation"
    );
    describe_counter!(
        SYNC_ORPHANS_REMOVED_TOTAL,
        "Total number of orphaned managed proxy hosts removed during resync"
    );
    describe_counter!(
        RUNTIME_RECONNECTS_TOTAL,
        "Total number of container runtime event stream reconnects"
    );
    describe_counter!(
        RUNTIME_EVENTS_TOTAL,
        "Total number of container lifecycle events received"
    );
    describe_counter!(
        NPM_REAUTHENTICATIONS_TOTAL,
        "Total number of proxy manager token renewals"
    );
}
