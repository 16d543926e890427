//! 조정 엔진
//!
//! 컨테이너 이벤트를 받아 레이블을 디코딩하고 프록시 API로 원격 상태를 수렴시킵니다.
//!
//! # Module Structure
//!
//! - [`error`]: Rejection reasons and pipeline errors
//! - [`port`]: Upstream address resolution
//! - [`labels`]: Label decoding into `DesiredConfig`
//! - [`engine`]: Single-writer reconciliation state machine
//! - [`status`]: Read-only snapshots for the dashboard
//! - [`sync`]: `LabelSync` pipeline wiring the event source to the engine

pub mod engine;
pub mod error;
pub mod labels;
pub mod port;
pub mod status;
pub mod sync;

pub use engine::{ManagedContainer, ReconciliationEngine, SyncState};
pub use error::{RejectionReason, SyncError};
pub use labels::{DecodeDefaults, DesiredConfig, decode};
pub use port::{PortContext, resolve};
pub use status::{ContainerStatus, StatusHandle, StatusSnapshot, SyncPhase};
pub use sync::{LabelSync, LabelSyncBuilder, evaluate_health};
