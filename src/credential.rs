//! Access token types.
//!
//! Defines the token endpoint response and the cached bearer token derived
//! from it.

use std::time::{Duration, Instant};

use serde::Deserialize;

/// Tokens are refreshed this long before they actually expire.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Body of a successful password-grant response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Bearer token held by the token cache.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Instant,
}

impl AccessToken {
    /// Build a token from the endpoint response, stamped relative to `issued_at`.
    ///
    /// Returns `None` when the response carries no `access_token`.
    pub fn from_response(response: TokenResponse, issued_at: Instant) -> Option<Self> {
        let value = response.access_token.filter(|t| !t.is_empty())?;
        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN));
        Some(Self {
            value,
            expires_at: issued_at + lifetime,
        })
    }

    /// Usable at `now`, keeping [`EXPIRY_MARGIN`] in reserve.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }
}
