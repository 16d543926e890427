//! labelsync 공통 크레이트
//!
//! 모든 labelsync 크레이트가 공유하는 에러, 설정, 도메인 타입,
//! 파이프라인 생명주기 trait, 메트릭 이름을 정의합니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{AgentError, ConfigError, PipelineError};

// 설정
pub use config::AgentConfig;

// 파이프라인 trait
pub use pipeline::{HealthStatus, Pipeline};

// 도메인 타입
pub use types::{ContainerSnapshot, PortMapping, Scheme, Upstream};
