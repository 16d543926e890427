//! 파이프라인 trait -- 장기 실행 모듈의 생명주기 정의

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// 모듈 상태 보고
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상 동작
    Healthy,
    /// 동작은 하지만 일부 기능 저하 (예: 런타임 재연결 중)
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 시작/정지/상태 확인 생명주기를 가지는 모듈
///
/// 데몬은 이 trait을 통해 동기화 파이프라인을 관리합니다.
pub trait Pipeline: Send {
    /// 백그라운드 태스크를 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), AgentError>> + Send;

    /// 백그라운드 태스크를 정지하고 종료를 기다립니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), AgentError>> + Send;

    /// 현재 상태를 보고합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}
