//! Proxy-host requests, remote resources and the wire payload.

use serde::{Deserialize, Serialize, Serializer};

use labelsync_core::types::Upstream;

/// `meta.managed_by` 값 -- 이 에이전트가 만든 리소스 표시
pub const MANAGED_BY: &str = "labelsync";

/// `advanced_config`에 기록되는 주석
const ADVANCED_CONFIG_NOTE: &str = "# Managed by labelsync\n";

/// Remote proxy-host identifier assigned by the proxy manager.
pub type RemoteId = u64;

/// Desired proxy-host configuration sent on create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyHostRequest {
    /// 도메인 목록 (순서 유지, 비어 있지 않음)
    pub domains: Vec<String>,
    /// 전달 대상
    pub upstream: Upstream,
    /// SSL 인증서 발급 및 강제 여부
    pub ssl: bool,
    /// Let's Encrypt 계정 이메일 (ssl 요청 시)
    pub letsencrypt_email: Option<String>,
}

/// A proxy host as listed by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProxyHost {
    /// 원격 ID
    pub id: RemoteId,
    /// 도메인 목록
    pub domains: Vec<String>,
    /// 이 에이전트가 생성했는지 여부 (`meta.managed_by`)
    pub managed: bool,
}

/// `GET /api/nginx/proxy-hosts` 항목
#[derive(Debug, Deserialize)]
pub(crate) struct RemoteProxyHostWire {
    id: RemoteId,
    #[serde(default)]
    domain_names: Vec<String>,
    #[serde(default)]
    meta: serde_json::Value,
}

impl From<RemoteProxyHostWire> for RemoteProxyHost {
    fn from(wire: RemoteProxyHostWire) -> Self {
        let managed = wire
            .meta
            .get("managed_by")
            .and_then(|v| v.as_str())
            .is_some_and(|v| v == MANAGED_BY);
        Self {
            id: wire.id,
            domains: wire.domain_names,
            managed,
        }
    }
}

/// 생성 응답 -- ID만 사용
#[derive(Debug, Deserialize)]
pub(crate) struct CreatedResource {
    pub id: RemoteId,
}

/// `GET /api/nginx/proxy-hosts/{id}` 응답 중 인증서 바인딩
#[derive(Debug, Deserialize)]
pub(crate) struct BoundCertificate {
    #[serde(default)]
    certificate_id: Option<u64>,
}

impl BoundCertificate {
    /// 바인딩된 인증서 ID (0은 인증서 없음)
    pub(crate) fn id(&self) -> Option<u64> {
        self.certificate_id.filter(|id| *id > 0)
    }
}

/// `certificate_id` 필드: 인증서 없음(0), 신규 발급("new"), 기존 인증서 유지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CertificateRequest {
    None,
    IssueNew,
    Existing(u64),
}

impl Serialize for CertificateRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::None => serializer.serialize_u64(0),
            Self::IssueNew => serializer.serialize_str("new"),
            Self::Existing(id) => serializer.serialize_u64(*id),
        }
    }
}

#[derive(Debug, Serialize)]
struct PayloadMeta<'a> {
    managed_by: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    letsencrypt_email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    letsencrypt_agree: Option<bool>,
}

/// Body of `POST`/`PUT /api/nginx/proxy-hosts`.
#[derive(Debug, Serialize)]
pub(crate) struct ProxyHostPayload<'a> {
    domain_names: &'a [String],
    forward_scheme: &'static str,
    forward_host: &'a str,
    forward_port: u16,
    access_list_id: u64,
    certificate_id: CertificateRequest,
    ssl_forced: bool,
    caching_enabled: bool,
    allow_websocket_upgrade: bool,
    block_exploits: bool,
    http2_support: bool,
    hsts_enabled: bool,
    hsts_subdomains: bool,
    meta: PayloadMeta<'a>,
    advanced_config: &'static str,
    locations: &'static [serde_json::Value],
}

impl<'a> From<&'a ProxyHostRequest> for ProxyHostPayload<'a> {
    fn from(req: &'a ProxyHostRequest) -> Self {
        let (certificate_id, letsencrypt_email, letsencrypt_agree) = if req.ssl {
            (
                CertificateRequest::IssueNew,
                Some(req.letsencrypt_email.as_deref().unwrap_or_default()),
                Some(true),
            )
        } else {
            (CertificateRequest::None, None, None)
        };

        Self {
            domain_names: &req.domains,
            forward_scheme: req.upstream.scheme.as_str(),
            forward_host: &req.upstream.host,
            forward_port: req.upstream.port,
            access_list_id: 0,
            certificate_id,
            ssl_forced: req.ssl,
            caching_enabled: false,
            allow_websocket_upgrade: true,
            block_exploits: true,
            http2_support: true,
            hsts_enabled: false,
            hsts_subdomains: false,
            meta: PayloadMeta {
                managed_by: MANAGED_BY,
                letsencrypt_email,
                letsencrypt_agree,
            },
            advanced_config: ADVANCED_CONFIG_NOTE,
            locations: &[],
        }
    }
}

impl ProxyHostPayload<'_> {
    /// Keeps an already issued certificate instead of requesting a new one.
    pub(crate) fn keep_certificate(mut self, certificate_id: Option<u64>) -> Self {
        if let (CertificateRequest::IssueNew, Some(id)) = (self.certificate_id, certificate_id) {
            self.certificate_id = CertificateRequest::Existing(id);
        }
        self
    }
}
