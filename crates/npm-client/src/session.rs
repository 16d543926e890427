//! 인증 세션 -- 토큰 및 만료 시각 캐시

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

use crate::error::NpmError;

/// 만료 전 갱신 여유 시간 (분)
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Bearer token issued by `POST /api/tokens`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    /// Bearer 토큰
    pub token: String,
    /// 만료 시각 (UTC)
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    /// Whether the token can still be used at `now`.
    ///
    /// A token stops being usable five minutes before its stated expiry.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - TimeDelta::minutes(REFRESH_MARGIN_MINUTES)
    }

    /// Same as [`is_usable_at`](Self::is_usable_at) with the current time.
    pub fn is_usable(&self) -> bool {
        self.is_usable_at(Utc::now())
    }
}

/// `POST /api/tokens` 응답 본문
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: String,
    pub expires: String,
}

impl TryFrom<TokenResponse> for AuthSession {
    type Error = NpmError;

    fn try_from(resp: TokenResponse) -> Result<Self, Self::Error> {
        let expires_at = DateTime::parse_from_rfc3339(&resp.expires)
            .map_err(|e| NpmError::Decode(format!("invalid token expiry '{}': {e}", resp.expires)))?
            .with_timezone(&Utc);
        Ok(Self {
            token: resp.token,
            expires_at,
        })
    }
}
