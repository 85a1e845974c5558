//! Error types for the HTTP and configuration seams.
//!
//! The driver and binary wrap these in `anyhow::Error` with context; the
//! client needs a typed error to decide what is worth retrying.

use thiserror::Error;

/// Failure talking to the Optiply API or its token endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Server-side failure (5xx) or throttling (429). Worth another attempt.
    #[error("retriable API error {status}: {body}")]
    Retriable { status: u16, body: String },

    /// Client error (4xx other than 401/404). Retrying will not help.
    #[error("fatal API error {status}: {body}")]
    Fatal { status: u16, body: String },

    /// The bearer token was rejected; the cache gets invalidated before the
    /// next attempt.
    #[error("access token rejected: {body}")]
    Unauthorized { body: String },

    /// The password grant itself failed.
    #[error("token request failed with {status}: {body}")]
    Token { status: u16, body: String },

    #[error("token response is missing `access_token`")]
    MissingAccessToken,

    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("HTTP transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("invalid API base URL: {0}")]
    InvalidUrl(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// Whether the request may succeed if sent again.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ApiError::Retriable { .. } | ApiError::Unauthorized { .. } | ApiError::Timeout(_)
        ) || matches!(self, ApiError::Transport(e) if e.is_connect())
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err)
        } else {
            ApiError::Transport(err)
        }
    }
}

/// Invalid or incomplete target configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("config file {path} must contain a JSON object")]
    NotAnObject { path: String },

    #[error("invalid config: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("either `basic_token` or both `client_id` and `client_secret` must be set")]
    MissingBasicToken,

    #[error("`{field}` must be an integer, got {value:?}")]
    InvalidId { field: &'static str, value: String },

    #[error("`{field}` is not a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("`max_tries` must be at least 1")]
    ZeroTries,
}
