//! 에러 타입 -- 도메인별 에러 정의

/// labelsync 최상위 에러 타입
///
/// 각 도메인 크레이트의 에러는 `From` 구현을 통해 이 타입으로 변환됩니다.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// 설정 관련 에러 (시작 시 치명적)
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 컨테이너 런타임 연결/호출 에러
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// 프록시 매니저 API 에러
    #[error("remote api error: {0}")]
    Remote(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 필수 설정 값 누락
    #[error("missing required config value '{field}' (env: {env_key})")]
    MissingValue { field: String, env_key: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,

    /// 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 채널 통신 실패
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}
