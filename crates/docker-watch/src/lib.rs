//! 컨테이너 이벤트 소스
//!
//! Docker 데몬의 실행 중인 컨테이너 목록과 생명주기 이벤트 스트림을
//! [`ContainerEvent`] 시퀀스로 변환합니다. 레이블 필터링은 하지 않으며,
//! 연결이 끊기면 지수 백오프로 무기한 재연결합니다.
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`DockerWatchError`)
//! - [`docker`]: Docker API abstraction (`DockerClient` trait, `BollardDockerClient`)
//! - [`event`]: Emitted events (`ContainerEvent`, `LifecycleEvent`)
//! - [`source`]: Reconnecting event source (`ContainerEventSource`, `Backoff`)
//!
//! # Architecture
//!
//! ```text
//! Docker daemon --list/inspect--> ContainerEventSource --mpsc--> reconciliation engine
//!               --events-------->        |
//!                                   Backoff (on RuntimeUnavailable)
//! ```

pub mod docker;
pub mod error;
pub mod event;
pub mod source;

pub use docker::{BollardDockerClient, DockerClient, EventStream};
pub use error::DockerWatchError;
pub use event::{ContainerEvent, LifecycleAction, LifecycleEvent};
pub use source::{Backoff, ContainerEventSource, RuntimeStatus};
