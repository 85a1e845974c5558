use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode, Url};

use crate::backoff::ExponentialBackoff;
use crate::config::TargetConfig;
use crate::error::ApiError;
use crate::token_cache::TokenCache;
use crate::types::{Document, JSON_API, WriteMethod};

const BACKOFF_BASE: u64 = 2;
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const USER_AGENT: &str = concat!("target-optiply/", env!("CARGO_PKG_VERSION"));

/// Result of a request the API accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse {
    /// 2xx, with the response body.
    Success { status: u16, body: String },
    /// 404. The record is dropped rather than failing the run.
    NotFound { body: String },
}

/// Client for the Optiply REST API.
///
/// Clones share the HTTP connection pool and the token cache.
#[derive(Clone)]
pub struct OptiplyClient {
    http_client: Client,
    base_url: Url,
    scope: Vec<(&'static str, String)>,
    tokens: TokenCache,
    max_tries: u32,
    backoff_factor: Duration,
}

impl OptiplyClient {
    pub fn new(config: &TargetConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.api_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ApiError::InvalidUrl(config.api_url.clone()))?;

        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(ApiError::Transport)?;

        let tokens = TokenCache::new(
            http_client.clone(),
            &config.auth_url,
            config.api_credentials.clone(),
        );

        Ok(Self {
            http_client,
            base_url,
            scope: config.api_credentials.scope_params(),
            tokens,
            max_tries: config.max_tries,
            backoff_factor: config.backoff_factor,
        })
    }

    /// `{api_url}/{endpoint}[/{id}]`, without the tenant query string.
    ///
    /// Both parts are appended as single path segments, so `/`, `?` and `#`
    /// inside an id are percent-encoded rather than changing the target.
    pub fn url(&self, endpoint: &str, id: Option<&str>) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(endpoint)
            .extend(id);
        Ok(url)
    }

    /// Send a JSON:API document, retrying transient failures.
    ///
    /// Up to `max_tries` attempts are made. A 401 invalidates the cached
    /// token before the next attempt.
    pub async fn send(
        &self,
        method: WriteMethod,
        endpoint: &str,
        id: Option<&str>,
        document: &Document,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url(endpoint, id)?;
        let body = serde_json::to_vec(document)?;
        let mut backoff = ExponentialBackoff::new(BACKOFF_BASE)
            .factor(self.backoff_factor)
            .max_delay(MAX_BACKOFF);
        let mut attempt = 1;

        loop {
            let err = match self.attempt(method, &url, &body).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if matches!(err, ApiError::Unauthorized { .. }) {
                self.tokens.invalidate().await;
            }

            if !err.is_retriable() || attempt >= self.max_tries {
                return Err(err);
            }

            tracing::warn!(
                %method,
                %url,
                attempt,
                max_tries = self.max_tries,
                "Retrying request: {}",
                err
            );
            backoff.wait().await;
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        method: WriteMethod,
        url: &Url,
        body: &[u8],
    ) -> Result<ApiResponse, ApiError> {
        let token = self.tokens.access_token().await?;

        let response = self
            .http_client
            .request(method.as_reqwest(), url.clone())
            .query(&self.scope)
            .header(CONTENT_TYPE, JSON_API)
            .header(ACCEPT, JSON_API)
            .bearer_auth(token)
            .body(body.to_vec())
            .send()
            .await?;

        validate_response(response).await
    }
}

/// Map an HTTP response onto success, a tolerated 404, or an error.
async fn validate_response(response: Response) -> Result<ApiResponse, ApiError> {
    let status = response.status();
    let url = response.url().clone();
    let body = response.text().await?;

    match status {
        s if s.is_success() => Ok(ApiResponse::Success {
            status: s.as_u16(),
            body,
        }),
        s if s == StatusCode::NOT_FOUND => {
            tracing::warn!("Resource not found (404): {}", url);
            Ok(ApiResponse::NotFound { body })
        }
        s if s == StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized { body }),
        s if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => {
            Err(ApiError::Retriable {
                status: s.as_u16(),
                body,
            })
        }
        s => Err(ApiError::Fatal {
            status: s.as_u16(),
            body,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> TargetConfig {
        TargetConfig::from_value(
            json!({
                "api_url": "https://api.example.com/v1/",
                "api_credentials": {
                    "username": "u",
                    "password": "p",
                    "basic_token": "b",
                    "account_id": 1,
                    "coupling_id": 2
                }
            }),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_url_joins_segments() {
        let client = OptiplyClient::new(&config()).unwrap();
        assert_eq!(
            client.url("products", None).unwrap().as_str(),
            "https://api.example.com/v1/products"
        );
        assert_eq!(
            client.url("buyOrders", Some("12")).unwrap().as_str(),
            "https://api.example.com/v1/buyOrders/12"
        );
    }

    #[test]
    fn test_url_encodes_id() {
        let client = OptiplyClient::new(&config()).unwrap();
        assert_eq!(
            client.url("suppliers", Some("../products")).unwrap().as_str(),
            "https://api.example.com/v1/suppliers/..%2Fproducts"
        );
        assert_eq!(
            client
                .url("suppliers", Some("5?accountId=999#x"))
                .unwrap()
                .as_str(),
            "https://api.example.com/v1/suppliers/5%3FaccountId=999%23x"
        );
    }

    #[test]
    fn test_scope_from_credentials() {
        let client = OptiplyClient::new(&config()).unwrap();
        assert_eq!(
            client.scope,
            vec![("accountId", "1".to_string()), ("couplingId", "2".to_string())]
        );
    }
}
