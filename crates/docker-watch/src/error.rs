//! 컨테이너 이벤트 소스 에러 타입

use labelsync_core::error::AgentError;

/// 컨테이너 런타임 관련 에러
#[derive(Debug, Clone, thiserror::Error)]
pub enum DockerWatchError {
    /// 런타임 연결 끊김 또는 접속 불가 (재연결 대상)
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Docker API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// 컨테이너를 찾을 수 없음
    #[error("container not found: {0}")]
    ContainerNotFound(String),
}

impl DockerWatchError {
    /// 재연결로 복구해야 하는 에러인지 확인합니다.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::RuntimeUnavailable(_))
    }
}

impl From<DockerWatchError> for AgentError {
    fn from(err: DockerWatchError) -> Self {
        AgentError::Runtime(err.to_string())
    }
}
