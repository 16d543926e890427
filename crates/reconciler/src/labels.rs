//! 레이블 디코더 -- 컨테이너 메타데이터를 검증된 [`DesiredConfig`]로 변환
//!
//! 레이블 키는 접두어(기본 `npm.proxy.`) 뒤에 다음 이름을 붙입니다.
//!
//! | 키 | 필수 | 기본값 |
//! |----|------|--------|
//! | `host` | 예 | - |
//! | `port` | 아니오 | `80` |
//! | `scheme` | 아니오 | `http` |
//! | `ssl` | 아니오 | `true` |
//! | `forward_host` | 아니오 | 전역 기본값 |

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use labelsync_core::config::AgentConfig;
use labelsync_core::types::{ContainerSnapshot, Scheme, Upstream};
use labelsync_npm::ProxyHostRequest;

use crate::error::RejectionReason;
use crate::port::{self, PortContext};

const DEFAULT_PORT: u16 = 80;

/// 레이블이 없을 때 적용되는 전역 값
#[derive(Debug, Clone, Default)]
pub struct DecodeDefaults {
    /// 레이블 키 접두어
    pub label_prefix: String,
    /// 전역 forward host
    pub forward_host: Option<String>,
    /// Let's Encrypt 이메일
    pub letsencrypt_email: Option<String>,
}

impl DecodeDefaults {
    /// 에이전트 설정에서 기본값을 추출합니다.
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            label_prefix: config.labels.prefix.clone(),
            forward_host: config
                .sync
                .default_forward_host
                .clone()
                .filter(|h| !h.trim().is_empty()),
            letsencrypt_email: Some(config.npm.letsencrypt_email.clone())
                .filter(|e| !e.trim().is_empty()),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.label_prefix, name)
    }
}

/// Validated proxy configuration derived from one container's labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredConfig {
    /// 도메인 목록 (소문자, 레이블 순서 유지)
    pub domains: Vec<String>,
    /// 해석된 업스트림
    pub upstream: Upstream,
    /// SSL 요청 여부
    pub ssl: bool,
    /// 인증서 발급 이메일
    pub letsencrypt_email: Option<String>,
    /// 위 필드 전체에 대한 SHA-256 지문 (hex)
    pub signature: String,
}

impl DesiredConfig {
    /// Whether any domain is shared with `other`.
    pub fn overlaps(&self, other: &[String]) -> bool {
        self.domains.iter().any(|d| other.contains(d))
    }

    /// Builds the request sent to the proxy API.
    pub fn to_request(&self) -> ProxyHostRequest {
        ProxyHostRequest {
            domains: self.domains.clone(),
            upstream: self.upstream.clone(),
            ssl: self.ssl,
            letsencrypt_email: self.letsencrypt_email.clone(),
        }
    }
}

/// Decodes a container's labels into a [`DesiredConfig`].
///
/// # Errors
///
/// - `MissingRequiredLabel`: no host label (the container is not managed)
/// - `InvalidDomainList`: empty, blank or duplicate domain entries
/// - `InvalidLabel`: unparseable port or scheme
/// - `UnresolvableUpstream`: see [`port::resolve`]
pub fn decode(
    snapshot: &ContainerSnapshot,
    defaults: &DecodeDefaults,
) -> Result<DesiredConfig, RejectionReason> {
    let host_key = defaults.key("host");
    let label = |name: &str| snapshot.labels.get(&defaults.key(name)).map(String::as_str);

    let raw_domains = snapshot
        .labels
        .get(&host_key)
        .ok_or_else(|| RejectionReason::MissingRequiredLabel(host_key.clone()))?;
    let domains = parse_domains(raw_domains)?;

    let port = match label("port") {
        None => DEFAULT_PORT,
        Some(raw) => parse_port(raw).map_err(|reason| RejectionReason::InvalidLabel {
            label: defaults.key("port"),
            reason,
        })?,
    };

    let scheme = match label("scheme") {
        None => Scheme::default(),
        Some(raw) => raw
            .parse::<Scheme>()
            .map_err(|reason| RejectionReason::InvalidLabel {
                label: defaults.key("scheme"),
                reason,
            })?,
    };

    // only an explicit "true" enables ssl once the label is present
    let ssl = label("ssl").is_none_or(|v| v.trim().eq_ignore_ascii_case("true"));

    let explicit_forward_host = label("forward_host")
        .filter(|h| !h.trim().is_empty())
        .or(defaults.forward_host.as_deref());

    let upstream = port::resolve(
        PortContext {
            label_port: port,
            ports: &snapshot.ports,
            gateway_ip: snapshot.gateway_ip.as_deref(),
            container_ip: snapshot.container_ip.as_deref(),
            explicit_forward_host,
        },
        scheme,
    )?;

    let letsencrypt_email = if ssl {
        defaults.letsencrypt_email.clone()
    } else {
        None
    };

    let signature = signature(&domains, &upstream, ssl, letsencrypt_email.as_deref());

    Ok(DesiredConfig {
        domains,
        upstream,
        ssl,
        letsencrypt_email,
        signature,
    })
}

fn parse_domains(raw: &str) -> Result<Vec<String>, RejectionReason> {
    let invalid = |reason: String| RejectionReason::InvalidDomainList {
        value: raw.to_owned(),
        reason,
    };

    let mut seen = HashSet::new();
    let mut domains = Vec::new();
    for entry in raw.split(',') {
        let domain = entry.trim().to_ascii_lowercase();
        if domain.is_empty() {
            return Err(invalid("empty entry".to_owned()));
        }
        if domain.chars().any(char::is_whitespace) {
            return Err(invalid(format!("'{domain}' contains whitespace")));
        }
        if !seen.insert(domain.clone()) {
            return Err(invalid(format!("duplicate entry '{domain}'")));
        }
        domains.push(domain);
    }
    Ok(domains)
}

fn parse_port(raw: &str) -> Result<u16, String> {
    match raw.trim().parse::<u16>() {
        Ok(0) => Err("port must be between 1 and 65535".to_owned()),
        Ok(port) => Ok(port),
        Err(e) => Err(format!("'{raw}' is not a port number: {e}")),
    }
}

fn signature(domains: &[String], upstream: &Upstream, ssl: bool, email: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    for domain in domains {
        hasher.update(domain.as_bytes());
        hasher.update(b",");
    }
    hasher.update(b"\n");
    hasher.update(upstream.to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(if ssl { b"ssl" as &[u8] } else { b"plain" });
    hasher.update(b"\n");
    hasher.update(email.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}
