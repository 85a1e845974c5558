//! Thread-safe access token cache.
//!
//! Every sink shares one cache via `Arc<RwLock<>>`, so a single password
//! grant serves all streams until the token nears expiry or the API rejects
//! it.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio::sync::RwLock;

use crate::config::ApiCredentials;
use crate::credential::{AccessToken, TokenResponse};
use crate::error::ApiError;

/// Token cache shared across all client clones.
///
/// Readers check the cached token under a read lock. Only one writer runs
/// the password grant at a time; writers that queued behind it reuse the
/// fresh token instead of requesting another.
#[derive(Clone)]
pub struct TokenCache {
    inner: Arc<RwLock<Option<AccessToken>>>,
    http_client: Client,
    auth_url: Arc<str>,
    credentials: Arc<ApiCredentials>,
}

impl TokenCache {
    pub fn new(http_client: Client, auth_url: &str, credentials: ApiCredentials) -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            http_client,
            auth_url: Arc::from(auth_url),
            credentials: Arc::new(credentials),
        }
    }

    /// A bearer token, fetching a new one when the cache is empty or stale.
    pub async fn access_token(&self) -> Result<String, ApiError> {
        if let Some(token) = self.get_valid_token().await {
            return Ok(token);
        }
        self.refresh().await
    }

    /// Cached token if it is still valid (fast path with read lock).
    pub async fn get_valid_token(&self) -> Option<String> {
        let cache = self.inner.read().await;
        cache
            .as_ref()
            .filter(|token| token.is_valid())
            .map(|token| token.value.clone())
    }

    /// Run the password grant (slow path with write lock).
    ///
    /// The lock is held across the request so that concurrent callers that
    /// all saw a stale token wait for one refresh instead of issuing their own.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let mut cache = self.inner.write().await;

        // Double-check: another task may have refreshed while we waited
        if let Some(token) = cache.as_ref().filter(|token| token.is_valid()) {
            tracing::debug!("another task already refreshed the access token");
            return Ok(token.value.clone());
        }

        tracing::debug!(auth_url = %self.auth_url, "requesting access token");
        let token = self.request_token().await?;
        let value = token.value.clone();
        *cache = Some(token);

        tracing::info!("Successfully updated access token");
        Ok(value)
    }

    /// Drop the cached token. Called when the API answers 401.
    pub async fn invalidate(&self) {
        let mut cache = self.inner.write().await;
        if cache.take().is_some() {
            tracing::debug!("invalidated cached access token");
        }
    }

    async fn request_token(&self) -> Result<AccessToken, ApiError> {
        let issued_at = Instant::now();
        let response = self
            .http_client
            .post(&*self.auth_url)
            .query(&[("grant_type", "password")])
            .header(AUTHORIZATION, format!("Basic {}", self.credentials.basic_token))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&[
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await
            .inspect_err(|e| tracing::error!("Error updating access token: {}", e))?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), "token request rejected");
            return Err(ApiError::Token {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        AccessToken::from_response(parsed, issued_at).ok_or(ApiError::MissingAccessToken)
    }
}
