//! 프록시 API 클라이언트
//!
//! Nginx Proxy Manager REST API에 대한 얇지만 상태를 가진 래퍼입니다.
//! 토큰은 지연 발급되어 캐시되며, 만료 5분 전 또는 401 응답 시 자동으로 갱신됩니다.
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`NpmError`)
//! - [`session`]: Cached bearer token (`AuthSession`)
//! - [`types`]: Requests, remote resources and wire payloads
//! - [`client`]: `ProxyApi` trait and the reqwest-backed `NpmClient`

pub mod client;
pub mod error;
pub mod session;
pub mod types;

pub use client::{NpmClient, ProxyApi};
pub use error::NpmError;
pub use session::AuthSession;
pub use types::{MANAGED_BY, ProxyHostRequest, RemoteId, RemoteProxyHost};
