//! 설정 관리 -- 환경변수 기반 런타임 설정
//!
//! [`AgentConfig`]는 에이전트의 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. 환경변수 (`NPM_API_BASE_URL`, `LABELSYNC_RETRY_INTERVAL_SECS` 등)
//! 2. 설정 파일 (선택, TOML)
//! 3. 기본값 (`Default` 구현)
//!
//! 필수 값(API 주소, 계정, 비밀번호)이 없으면 [`ConfigError`]를 반환하며,
//! 데몬은 시작 단계에서 종료합니다.
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), labelsync_core::error::AgentError> {
//! use labelsync_core::config::AgentConfig;
//!
//! // 환경변수만 사용
//! let config = AgentConfig::load(None::<&str>).await?;
//!
//! // TOML 파일 + 환경변수 오버라이드
//! let config = AgentConfig::load(Some("/etc/labelsync/labelsync.toml")).await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AgentError, ConfigError};

/// 프록시 매니저 API 주소 환경변수
pub const ENV_NPM_BASE_URL: &str = "NPM_API_BASE_URL";
/// 프록시 매니저 계정 환경변수
pub const ENV_NPM_USER: &str = "NPM_API_USER";
/// 프록시 매니저 비밀번호 환경변수
pub const ENV_NPM_PASSWORD: &str = "NPM_API_PASSWORD";
/// Let's Encrypt 기본 이메일 환경변수
pub const ENV_NPM_LE_EMAIL: &str = "NPM_DEFAULT_LE_EMAIL";
/// 기본 forward host 환경변수
pub const ENV_DEFAULT_FORWARD_HOST: &str = "NPM_DEFAULT_FORWARD_HOST";
/// 런타임 엔드포인트 환경변수
pub const ENV_DOCKER_HOST: &str = "DOCKER_HOST";

/// 에이전트 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 프록시 매니저 API 설정
    #[serde(default)]
    pub npm: NpmConfig,
    /// 컨테이너 런타임 설정
    #[serde(default)]
    pub docker: DockerConfig,
    /// 동기화 엔진 설정
    #[serde(default)]
    pub sync: SyncConfig,
    /// 레이블 설정
    #[serde(default)]
    pub labels: LabelConfig,
    /// 상태 대시보드 설정
    #[serde(default)]
    pub status: StatusConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AgentConfig {
    /// 설정을 로드하고 환경변수 오버라이드 후 검증합니다.
    ///
    /// `path`가 `None`이면 기본값에서 시작합니다.
    pub async fn load(path: Option<impl AsRef<Path>>) -> Result<Self, AgentError> {
        let mut config = match path {
            Some(path) => Self::from_file(path).await?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 읽습니다 (환경변수 오버라이드, 검증 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AgentError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                AgentError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, AgentError> {
        toml::from_str(toml_str).map_err(|e| {
            AgentError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LABELSYNC_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LABELSYNC_LOG_FORMAT");

        // Proxy manager
        override_string(&mut self.npm.base_url, ENV_NPM_BASE_URL);
        override_string(&mut self.npm.identity, ENV_NPM_USER);
        override_string(&mut self.npm.secret, ENV_NPM_PASSWORD);
        override_string(&mut self.npm.letsencrypt_email, ENV_NPM_LE_EMAIL);
        override_u64(
            &mut self.npm.request_timeout_secs,
            "LABELSYNC_REQUEST_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.npm.write_retry_delay_ms,
            "LABELSYNC_WRITE_RETRY_DELAY_MS",
        );

        // Docker
        override_string(&mut self.docker.endpoint, ENV_DOCKER_HOST);
        override_u64(&mut self.docker.reconnect_base_ms, "LABELSYNC_RECONNECT_BASE_MS");
        override_u64(
            &mut self.docker.reconnect_max_secs,
            "LABELSYNC_RECONNECT_MAX_SECS",
        );

        // Sync
        override_u64(
            &mut self.sync.retry_interval_secs,
            "LABELSYNC_RETRY_INTERVAL_SECS",
        );
        override_opt_string(&mut self.sync.default_forward_host, ENV_DEFAULT_FORWARD_HOST);

        // Labels
        override_string(&mut self.labels.prefix, "LABELSYNC_LABEL_PREFIX");

        // Status
        override_bool(&mut self.status.enabled, "LABELSYNC_STATUS_ENABLED");
        override_string(&mut self.status.listen_addr, "LABELSYNC_STATUS_BIND");

        // Metrics
        override_bool(&mut self.metrics.enabled, "LABELSYNC_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LABELSYNC_METRICS_ADDR");
        override_u16(&mut self.metrics.port, "LABELSYNC_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AgentError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        require(&self.npm.base_url, "npm.base_url", ENV_NPM_BASE_URL)?;
        require(&self.npm.identity, "npm.identity", ENV_NPM_USER)?;
        require(&self.npm.secret, "npm.secret", ENV_NPM_PASSWORD)?;

        if !(self.npm.base_url.starts_with("http://") || self.npm.base_url.starts_with("https://"))
        {
            return Err(invalid(
                "npm.base_url",
                "must start with http:// or https://".to_owned(),
            ));
        }

        if self.npm.request_timeout_secs == 0 {
            return Err(invalid(
                "npm.request_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.sync.retry_interval_secs == 0 {
            return Err(invalid(
                "sync.retry_interval_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.docker.reconnect_base_ms == 0 {
            return Err(invalid(
                "docker.reconnect_base_ms",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.docker.reconnect_max_secs == 0
            || self.docker.reconnect_max_secs.saturating_mul(1000) < self.docker.reconnect_base_ms
        {
            return Err(invalid(
                "docker.reconnect_max_secs",
                "must be non-zero and not below reconnect_base_ms".to_owned(),
            ));
        }

        if self.sync.event_channel_capacity == 0 {
            return Err(invalid(
                "sync.event_channel_capacity",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.labels.prefix.is_empty() {
            return Err(invalid("labels.prefix", "must not be empty".to_owned()));
        }

        if self.status.enabled && self.status.listen_addr.is_empty() {
            return Err(invalid(
                "status.listen_addr",
                "must not be empty when status is enabled".to_owned(),
            ));
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 프록시 매니저 API 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NpmConfig {
    /// API 기본 주소 (예: `http://npm:81`)
    pub base_url: String,
    /// 로그인 이메일
    pub identity: String,
    /// 로그인 비밀번호
    #[serde(skip_serializing)]
    pub secret: String,
    /// 인증서 발급용 Let's Encrypt 이메일
    pub letsencrypt_email: String,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 쓰기 작업 재시도 전 대기 시간 (밀리초)
    pub write_retry_delay_ms: u64,
}

impl Default for NpmConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            identity: String::new(),
            secret: String::new(),
            letsencrypt_email: String::new(),
            request_timeout_secs: 10,
            write_retry_delay_ms: 500,
        }
    }
}

/// 컨테이너 런타임 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// 런타임 엔드포인트 (`unix:///var/run/docker.sock`, `tcp://host:2375`).
    /// 비어 있으면 로컬 기본값을 사용합니다.
    pub endpoint: String,
    /// 재연결 백오프 시작 간격 (밀리초)
    pub reconnect_base_ms: u64,
    /// 재연결 백오프 상한 (초)
    pub reconnect_max_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            reconnect_base_ms: 1000,
            reconnect_max_secs: 60,
        }
    }
}

/// 동기화 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 실패 항목 재시도 주기 (초)
    pub retry_interval_secs: u64,
    /// 레이블이 없을 때 사용할 forward host
    pub default_forward_host: Option<String>,
    /// 이벤트 채널 용량
    pub event_channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: 30,
            default_forward_host: None,
            event_channel_capacity: 256,
        }
    }
}

/// 레이블 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// 레이블 키 접두어
    pub prefix: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            prefix: "npm.proxy.".to_owned(),
        }
    }
}

/// 상태 대시보드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "0.0.0.0:8080".to_owned(),
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
        }
    }
}

fn invalid(field: &str, reason: String) -> AgentError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn require(value: &str, field: &str, env_key: &str) -> Result<(), AgentError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingValue {
            field: field.to_owned(),
            env_key: env_key.to_owned(),
        }
        .into());
    }
    Ok(())
}

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_opt_string(target: &mut Option<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        let val = val.trim();
        *target = if val.is_empty() {
            None
        } else {
            Some(val.to_owned())
        };
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
