//! Authentication
//!
//! Requests carry an IAM bearer token. A token can be supplied directly, or
//! obtained by exchanging an OAuth token at the IAM endpoint; exchanged tokens
//! are cached until shortly before they expire.

use super::error::{ApiError, ApiResult};
use super::http::HttpClient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if the IAM response carries no expiry (conservative: 1 hour)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Where the bearer token comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// Ready-to-use IAM token
    Iam(String),
    /// OAuth token exchanged for IAM tokens at `endpoint`
    OAuth { token: String, endpoint: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateIamTokenRequest<'a> {
    yandex_passport_oauth_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateIamTokenResponse {
    iam_token: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Credentials holder with token caching
#[derive(Clone)]
pub struct Credentials {
    source: TokenSource,
    http: HttpClient,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl Credentials {
    pub fn new(source: TokenSource, http: HttpClient) -> Self {
        Self {
            source,
            http,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get an access token for API calls
    pub async fn get_token(&self) -> ApiResult<String> {
        let (oauth_token, endpoint) = match &self.source {
            TokenSource::Iam(token) => return Ok(token.clone()),
            TokenSource::OAuth { token, endpoint } => (token, endpoint),
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached IAM token expired, exchanging again");
            }
        }

        let url = format!("{}/iam/v1/tokens", endpoint.trim_end_matches('/'));
        let response: CreateIamTokenResponse = self
            .http
            .post_anonymous(
                &url,
                &CreateIamTokenRequest {
                    yandex_passport_oauth_token: oauth_token,
                },
            )
            .await
            .map_err(|e| ApiError::Auth(format!("failed to exchange OAuth token: {}", e)))?;

        let ttl = response
            .expires_at
            .and_then(|at| (at - Utc::now()).to_std().ok())
            .unwrap_or(DEFAULT_TOKEN_TTL);
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: response.iam_token.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New IAM token cached, expires in ~{} minutes",
            ttl.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(response.iam_token)
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> ApiResult<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }

        self.get_token().await
    }
}
