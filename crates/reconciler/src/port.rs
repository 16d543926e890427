//! Upstream address resolution.
//!
//! Precedence, first match wins:
//!
//! 1. explicit forward host (label or global default) with the label port
//! 2. label port is a container port with a host binding: `(gateway, host port)`
//! 3. label port is itself a published host port: `(gateway, label port)`
//! 4. container IP with the label port
//!
//! Steps 2 and 3 need a gateway address. Only TCP bindings are considered.

use labelsync_core::types::{PortMapping, Scheme, Upstream};

use crate::error::RejectionReason;

/// Inputs to [`resolve`] taken from the container and its labels.
#[derive(Debug, Clone, Copy)]
pub struct PortContext<'a> {
    /// 레이블 포트
    pub label_port: u16,
    /// 런타임이 보고한 포트 매핑
    pub ports: &'a [PortMapping],
    /// 네트워크 게이트웨이 IP
    pub gateway_ip: Option<&'a str>,
    /// 컨테이너 IP
    pub container_ip: Option<&'a str>,
    /// 명시적 전달 호스트
    pub explicit_forward_host: Option<&'a str>,
}

/// Resolves the address the proxy should forward to.
///
/// # Errors
///
/// Returns [`RejectionReason::UnresolvableUpstream`] when no forward host,
/// gateway binding or container IP is available.
pub fn resolve(ctx: PortContext<'_>, scheme: Scheme) -> Result<Upstream, RejectionReason> {
    let upstream = |host: &str, port: u16| Upstream {
        host: host.to_owned(),
        port,
        scheme,
    };

    if let Some(host) = non_empty(ctx.explicit_forward_host) {
        return Ok(upstream(host, ctx.label_port));
    }

    if let Some(gateway) = non_empty(ctx.gateway_ip) {
        let tcp = || ctx.ports.iter().filter(|p| p.protocol == "tcp");

        if let Some(host_port) = tcp()
            .filter(|p| p.container_port == ctx.label_port)
            .find_map(|p| p.host_port)
        {
            return Ok(upstream(gateway, host_port));
        }

        if tcp().any(|p| p.host_port == Some(ctx.label_port)) {
            return Ok(upstream(gateway, ctx.label_port));
        }
    }

    non_empty(ctx.container_ip)
        .map(|ip| upstream(ip, ctx.label_port))
        .ok_or(RejectionReason::UnresolvableUpstream)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
