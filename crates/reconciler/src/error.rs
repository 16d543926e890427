//! 조정 엔진 에러 타입
//!
//! [`RejectionReason`]은 컨테이너 단위의 비치명적 거부 사유이고,
//! [`SyncError`]는 파이프라인 구성 및 원격 작업 실패를 표현합니다.

use labelsync_core::error::{AgentError, PipelineError};
use labelsync_docker::DockerWatchError;
use labelsync_npm::NpmError;

/// Why a container's labels did not produce a desired configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectionReason {
    /// 필수 호스트 레이블 없음 -- 관리 대상이 아님
    #[error("missing required label '{0}'")]
    MissingRequiredLabel(String),

    /// 도메인 목록이 비었거나 중복/빈 항목 포함
    #[error("invalid domain list '{value}': {reason}")]
    InvalidDomainList {
        /// 레이블 원본 값
        value: String,
        /// 거부 사유
        reason: String,
    },

    /// 포트/스킴 등 레이블 값 파싱 실패
    #[error("invalid label '{label}': {reason}")]
    InvalidLabel {
        /// 레이블 키
        label: String,
        /// 거부 사유
        reason: String,
    },

    /// 전달 호스트를 결정할 수 없음
    #[error("no forward host, gateway or container address available")]
    UnresolvableUpstream,
}

impl RejectionReason {
    /// Whether the container simply opted out (no host label).
    pub fn is_opt_out(&self) -> bool {
        matches!(self, Self::MissingRequiredLabel(_))
    }
}

/// 조정 파이프라인 에러
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// 프록시 API 호출 실패
    #[error(transparent)]
    Remote(#[from] NpmError),

    /// 컨테이너 런타임 에러
    #[error(transparent)]
    Runtime(#[from] DockerWatchError),

    /// 파이프라인 구성 에러
    #[error("build error: {field}: {reason}")]
    Build {
        /// 누락되거나 잘못된 항목
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<SyncError> for AgentError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Remote(e) => e.into(),
            SyncError::Runtime(e) => e.into(),
            SyncError::Build { field, reason } => {
                AgentError::Pipeline(PipelineError::InitFailed(format!("{field}: {reason}")))
            }
        }
    }
}
