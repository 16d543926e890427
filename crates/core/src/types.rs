//! 도메인 타입 -- 크레이트 간에 공유되는 컨테이너/업스트림 타입

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 프록시가 업스트림으로 전달할 때 사용하는 스킴
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// 평문 HTTP (기본값)
    #[default]
    Http,
    /// HTTPS
    Https,
}

impl Scheme {
    /// 와이어 포맷 문자열을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(format!("unsupported scheme '{other}', expected http or https")),
        }
    }
}

/// 프록시가 트래픽을 전달할 업스트림 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Upstream {
    /// 호스트 (IP 또는 호스트명)
    pub host: String,
    /// 포트
    pub port: u16,
    /// 스킴
    pub scheme: Scheme,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// 컨테이너 내부 포트와 호스트 포트 바인딩
///
/// 런타임이 보고한 포트 매핑 한 건을 나타냅니다.
/// 바인딩되지 않은 노출 포트는 `host_port`가 `None`입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// 컨테이너 내부 포트
    pub container_port: u16,
    /// 프로토콜 (tcp, udp)
    pub protocol: String,
    /// 호스트에 게시된 포트
    pub host_port: Option<u16>,
}

impl PortMapping {
    /// TCP 바인딩을 생성합니다.
    pub fn tcp(container_port: u16, host_port: Option<u16>) -> Self {
        Self {
            container_port,
            protocol: "tcp".to_owned(),
            host_port,
        }
    }
}

/// 런타임에서 관찰한 컨테이너 메타데이터
///
/// 컨테이너 런타임 API의 형태를 그대로 따르며, 레이블 필터링은 하지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    /// 런타임 컨테이너 ID
    pub id: String,
    /// 컨테이너 이름 (선행 `/` 제거)
    pub name: String,
    /// 컨테이너 레이블
    pub labels: HashMap<String, String>,
    /// 포트 매핑 목록
    pub ports: Vec<PortMapping>,
    /// 첫 번째 네트워크의 게이트웨이 IP
    pub gateway_ip: Option<String>,
    /// 첫 번째 네트워크의 컨테이너 IP
    pub container_ip: Option<String>,
}
