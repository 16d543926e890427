//! Proxy API client.
//!
//! [`ProxyApi`] is the seam the reconciliation engine talks through;
//! [`NpmClient`] implements it against the Nginx Proxy Manager REST API.
//!
//! # Request flow
//!
//! ```text
//! call ──> cached token usable? ──no──> POST /api/tokens
//!              │
//!              ▼
//!          send request ──transport error on write──> wait, send once more
//!              │
//!              ▼
//!          401? ──> drop token, log in again, resend once
//!              │          └── 401 again ──> AuthenticationFailure
//!              ▼
//!          status check ──> RemoteApi { status, body }
//! ```

use std::future::Future;
use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use labelsync_core::config::NpmConfig;
use labelsync_core::metrics as m;

use crate::error::NpmError;
use crate::session::{AuthSession, TokenResponse};
use crate::types::{
    BoundCertificate, CreatedResource, ProxyHostPayload, ProxyHostRequest, RemoteId, RemoteProxyHost,
    RemoteProxyHostWire,
};

const TOKENS_PATH: &str = "/api/tokens";
const PROXY_HOSTS_PATH: &str = "/api/nginx/proxy-hosts";

/// Operations the reconciliation engine needs from the proxy manager.
///
/// Implementations own their authentication state and must be safe to
/// call from several tasks at once.
pub trait ProxyApi: Send + Sync + 'static {
    /// Makes sure a usable token is cached, logging in if needed.
    fn ensure_authenticated(&self) -> impl Future<Output = Result<(), NpmError>> + Send;

    /// Creates a proxy host and returns its remote id.
    fn create_proxy_host(
        &self,
        request: &ProxyHostRequest,
    ) -> impl Future<Output = Result<RemoteId, NpmError>> + Send;

    /// Replaces the configuration of an existing proxy host.
    fn update_proxy_host(
        &self,
        id: RemoteId,
        request: &ProxyHostRequest,
    ) -> impl Future<Output = Result<(), NpmError>> + Send;

    /// Deletes a proxy host. A host that no longer exists counts as deleted.
    fn delete_proxy_host(&self, id: RemoteId) -> impl Future<Output = Result<(), NpmError>> + Send;

    /// Lists every proxy host known to the remote service.
    fn list_proxy_hosts(&self)
    -> impl Future<Output = Result<Vec<RemoteProxyHost>, NpmError>> + Send;
}

/// reqwest-backed Nginx Proxy Manager client.
///
/// # 사용 예시
/// ```ignore
/// let client = NpmClient::from_config(&config.npm)?;
/// let id = client.create_proxy_host(&request).await?;
/// ```
pub struct NpmClient {
    http: reqwest::Client,
    base_url: String,
    identity: String,
    secret: String,
    write_retry_delay: Duration,
    /// 캐시된 인증 세션 (이벤트 처리와 재시도 경로가 공유)
    session: Mutex<Option<AuthSession>>,
}

impl NpmClient {
    /// Builds a client from the `[npm]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns `NpmError::Transport` if the HTTP client cannot be built.
    pub fn from_config(config: &NpmConfig) -> Result<Self, NpmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| NpmError::Transport(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            identity: config.identity.clone(),
            secret: config.secret.clone(),
            write_retry_delay: Duration::from_millis(config.write_retry_delay_ms),
            session: Mutex::new(None),
        })
    }

    /// 설정된 API 기본 주소를 반환합니다.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn login(&self) -> Result<AuthSession, NpmError> {
        debug!(base_url = %self.base_url, "requesting api token");

        let response = self
            .http
            .post(self.url(TOKENS_PATH))
            .json(&serde_json::json!({
                "identity": self.identity,
                "secret": self.secret,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                    NpmError::AuthenticationFailure {
                        status: status.as_u16(),
                        body,
                    }
                } else {
                    NpmError::RemoteApi {
                        status: status.as_u16(),
                        body,
                    }
                },
            );
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| NpmError::Decode(e.to_string()))?;
        let session = AuthSession::try_from(token)?;
        info!(expires_at = %session.expires_at, "authenticated against proxy manager");
        Ok(session)
    }

    /// Returns a usable token, logging in when the cached one is missing or stale.
    async fn token(&self) -> Result<String, NpmError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref().filter(|s| s.is_usable()) {
            return Ok(session.token.clone());
        }
        let session = self.login().await?;
        let token = session.token.clone();
        *guard = Some(session);
        Ok(token)
    }

    /// Drops the cached session if it still holds `stale`.
    async fn invalidate(&self, stale: &str) {
        let mut guard = self.session.lock().await;
        if guard.as_ref().is_some_and(|s| s.token == stale) {
            *guard = None;
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        path: &str,
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> Result<Response, reqwest::Error> {
        let mut request = self
            .http
            .request(method.clone(), self.url(path))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await
    }

    /// Sends a request, retrying writes once after a transient network failure.
    async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> Result<Response, NpmError> {
        match self.send_once(method, path, body, token).await {
            Ok(response) => Ok(response),
            Err(e) if *method != Method::GET && is_transient(&e) => {
                warn!(
                    method = %method,
                    path,
                    error = %e,
                    retry_in_ms = self.write_retry_delay.as_millis() as u64,
                    "transient failure on write, retrying once"
                );
                tokio::time::sleep(self.write_retry_delay).await;
                self.send_once(method, path, body, token)
                    .await
                    .map_err(transport_error)
            }
            Err(e) => Err(transport_error(e)),
        }
    }

    /// Authenticated request with a single re-login on 401.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, NpmError> {
        let mut token = self.token().await?;
        let mut reauthenticated = false;

        loop {
            let response = self.dispatch(&method, path, body, &token).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            self.invalidate(&token).await;
            if reauthenticated {
                let body = response.text().await.unwrap_or_default();
                warn!(method = %method, path, "token rejected again after re-authentication");
                return Err(NpmError::AuthenticationFailure {
                    status: StatusCode::UNAUTHORIZED.as_u16(),
                    body,
                });
            }

            reauthenticated = true;
            metrics::counter!(m::NPM_REAUTHENTICATIONS_TOTAL).increment(1);
            info!(method = %method, path, "token rejected, re-authenticating");
            token = self.token().await?;
        }
    }
}

impl ProxyApi for NpmClient {
    async fn ensure_authenticated(&self) -> Result<(), NpmError> {
        self.token().await.map(|_| ())
    }

    async fn create_proxy_host(&self, request: &ProxyHostRequest) -> Result<RemoteId, NpmError> {
        let body = encode(ProxyHostPayload::from(request))?;
        let response = self
            .execute(Method::POST, PROXY_HOSTS_PATH, Some(&body))
            .await?;
        let created: CreatedResource = decode_success(response).await?;
        info!(
            remote_id = created.id,
            domains = ?request.domains,
            upstream = %request.upstream,
            ssl = request.ssl,
            "created proxy host"
        );
        Ok(created.id)
    }

    async fn update_proxy_host(
        &self,
        id: RemoteId,
        request: &ProxyHostRequest,
    ) -> Result<(), NpmError> {
        let path = format!("{PROXY_HOSTS_PATH}/{id}");

        // 이미 발급된 인증서가 있으면 재발급하지 않음
        let certificate_id = if request.ssl {
            let response = self.execute(Method::GET, &path, None).await?;
            let bound: BoundCertificate = decode_success(response).await?;
            bound.id()
        } else {
            None
        };

        let body = encode(ProxyHostPayload::from(request).keep_certificate(certificate_id))?;
        let response = self.execute(Method::PUT, &path, Some(&body)).await?;
        ensure_success(response).await?;
        info!(
            remote_id = id,
            domains = ?request.domains,
            upstream = %request.upstream,
            ssl = request.ssl,
            certificate_id,
            "updated proxy host"
        );
        Ok(())
    }

    async fn delete_proxy_host(&self, id: RemoteId) -> Result<(), NpmError> {
        let path = format!("{PROXY_HOSTS_PATH}/{id}");
        let response = self.execute(Method::DELETE, &path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(remote_id = id, "proxy host already gone");
            return Ok(());
        }
        ensure_success(response).await?;
        info!(remote_id = id, "deleted proxy host");
        Ok(())
    }

    async fn list_proxy_hosts(&self) -> Result<Vec<RemoteProxyHost>, NpmError> {
        let response = self.execute(Method::GET, PROXY_HOSTS_PATH, None).await?;
        let hosts: Vec<RemoteProxyHostWire> = decode_success(response).await?;
        Ok(hosts.into_iter().map(RemoteProxyHost::from).collect())
    }
}

fn encode(payload: ProxyHostPayload<'_>) -> Result<serde_json::Value, NpmError> {
    serde_json::to_value(payload)
        .map_err(|e| NpmError::Decode(format!("failed to encode payload: {e}")))
}

/// Connect failures, timeouts and connections dropped mid-request.
fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request() || has_reset_cause(err)
}

fn has_reset_cause(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

fn transport_error(err: reqwest::Error) -> NpmError {
    NpmError::Transport(err.to_string())
}

async fn ensure_success(response: Response) -> Result<Response, NpmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(NpmError::RemoteApi {
        status: status.as_u16(),
        body,
    })
}

async fn decode_success<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, NpmError> {
    ensure_success(response)
        .await?
        .json()
        .await
        .map_err(|e| NpmError::Decode(e.to_string()))
}
