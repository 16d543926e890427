//! 프록시 API 클라이언트 에러 타입

use labelsync_core::error::AgentError;

/// 프록시 API 클라이언트 에러
#[derive(Debug, Clone, thiserror::Error)]
pub enum NpmError {
    /// 네트워크 수준 실패 (연결 거부, 리셋, 타임아웃)
    #[error("transport error: {0}")]
    Transport(String),

    /// 원격 API가 실패 상태 코드를 반환함
    #[error("remote api error ({status}): {body}")]
    RemoteApi {
        /// HTTP 상태 코드
        status: u16,
        /// 응답 본문 (진단용)
        body: String,
    },

    /// 인증 실패 (로그인 거부 또는 재인증 후에도 401)
    #[error("authentication failed ({status}): {body}")]
    AuthenticationFailure {
        /// HTTP 상태 코드
        status: u16,
        /// 응답 본문
        body: String,
    },

    /// 응답 디코딩 실패
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl NpmError {
    /// HTTP 상태 코드가 있으면 반환합니다.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteApi { status, .. } | Self::AuthenticationFailure { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

impl From<NpmError> for AgentError {
    fn from(err: NpmError) -> Self {
        AgentError::Remote(err.to_string())
    }
}
