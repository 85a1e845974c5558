//! Target configuration.
//!
//! Settings arrive as one or more JSON files passed with `--config`. Later
//! files shallow-override earlier ones. Credentials live under
//! `api_credentials`; older deployments put the same keys at the top level,
//! which is still accepted when `api_credentials` is absent.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use base64::Engine;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ConfigError;

pub const DEFAULT_AUTH_URL: &str = "https://dashboard.optiply.nl/api/auth/oauth/token";
pub const DEFAULT_API_URL: &str = "https://api.optiply.com/v1";
/// Environment variable consulted when the config has no `api_url`.
pub const BASE_URL_ENV: &str = "optiply_base_url";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_TRIES: u32 = 5;
const DEFAULT_BACKOFF_FACTOR_MS: u64 = 2000;

/// Resolved, validated configuration.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Password-grant token endpoint.
    pub auth_url: String,
    /// Base of every API endpoint, without a trailing slash.
    pub api_url: String,
    pub api_credentials: ApiCredentials,
    pub request_timeout: Duration,
    /// Total attempts per API request, including the first.
    pub max_tries: u32,
    /// Delay unit of the exponential backoff.
    pub backoff_factor: Duration,
}

/// Credentials and tenant scope for the Optiply API.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub username: String,
    pub password: String,
    /// Value of the `Authorization: Basic` header sent to the token endpoint.
    pub basic_token: String,
    pub account_id: Option<i64>,
    pub coupling_id: Option<i64>,
}

impl ApiCredentials {
    /// Query parameters that scope every API call to the tenant.
    pub fn scope_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(2);
        if let Some(account_id) = self.account_id {
            params.push(("accountId", account_id.to_string()));
        }
        if let Some(coupling_id) = self.coupling_id {
            params.push(("couplingId", coupling_id.to_string()));
        }
        params
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("basic_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("coupling_id", &self.coupling_id)
            .finish()
    }
}

/// Identifiers show up both as JSON numbers and as numeric strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Int(i64),
    Text(String),
}

impl IdValue {
    fn resolve(self, field: &'static str) -> Result<i64, ConfigError> {
        match self {
            IdValue::Int(id) => Ok(id),
            IdValue::Text(text) => text.trim().parse().map_err(|_| ConfigError::InvalidId {
                field,
                value: text,
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawCredentials {
    username: Option<String>,
    password: Option<String>,
    basic_token: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    account_id: Option<IdValue>,
    coupling_id: Option<IdValue>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    auth_url: Option<String>,
    api_url: Option<String>,
    api_credentials: Option<RawCredentials>,
    request_timeout: Option<u64>,
    max_tries: Option<u32>,
    backoff_factor_ms: Option<u64>,
    #[serde(flatten)]
    flat: RawCredentials,
}

impl TargetConfig {
    /// Load and merge config files, then resolve against the environment.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut merged = Map::new();
        for path in paths {
            let path = path.as_ref();
            let display = path.display().to_string();
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: display.clone(),
                source,
            })?;
            let value: Value = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: display.clone(),
                source,
            })?;
            match value {
                Value::Object(object) => merged.extend(object),
                _ => return Err(ConfigError::NotAnObject { path: display }),
            }
        }

        Self::from_value(Value::Object(merged), std::env::var(BASE_URL_ENV).ok())
    }

    /// Resolve a config object. `env_base_url` is the value of
    /// `optiply_base_url`, used only when the config has no `api_url`.
    pub fn from_value(value: Value, env_base_url: Option<String>) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_value(value)?;

        let auth_url = raw.auth_url.unwrap_or_else(|| DEFAULT_AUTH_URL.to_string());
        validate_url("auth_url", &auth_url)?;

        let api_url = raw
            .api_url
            .or(env_base_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        validate_url("api_url", &api_url)?;

        let credentials = raw.api_credentials.unwrap_or(raw.flat);
        let api_credentials = resolve_credentials(credentials)?;

        let max_tries = raw.max_tries.unwrap_or(DEFAULT_MAX_TRIES);
        if max_tries == 0 {
            return Err(ConfigError::ZeroTries);
        }

        Ok(Self {
            auth_url,
            api_url,
            api_credentials,
            request_timeout: Duration::from_secs(
                raw.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            max_tries,
            backoff_factor: Duration::from_millis(
                raw.backoff_factor_ms.unwrap_or(DEFAULT_BACKOFF_FACTOR_MS),
            ),
        })
    }
}

fn resolve_credentials(raw: RawCredentials) -> Result<ApiCredentials, ConfigError> {
    let username = non_empty(raw.username).ok_or(ConfigError::Missing("username"))?;
    let password = non_empty(raw.password).ok_or(ConfigError::Missing("password"))?;

    let basic_token = match non_empty(raw.basic_token) {
        Some(token) => token,
        None => match (non_empty(raw.client_id), non_empty(raw.client_secret)) {
            (Some(id), Some(secret)) => basic_token(&id, &secret),
            _ => return Err(ConfigError::MissingBasicToken),
        },
    };

    Ok(ApiCredentials {
        username,
        password,
        basic_token,
        account_id: raw
            .account_id
            .map(|id| id.resolve("account_id"))
            .transpose()?,
        coupling_id: raw
            .coupling_id
            .map(|id| id.resolve("coupling_id"))
            .transpose()?,
    })
}

/// `base64(client_id:client_secret)`, as expected by the token endpoint.
pub fn basic_token(client_id: &str, client_secret: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("{client_id}:{client_secret}"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
        })
}
