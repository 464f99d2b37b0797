//! HTTP utilities for Cloud Backup REST API calls

use super::error::{ApiError, ApiResult, Code, Status};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Sanitize response body for logging
/// Truncates long responses and drops non-printable characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for API calls
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("ycbackup/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self { client })
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str, token: &str) -> ApiResult<T> {
        tracing::debug!("GET {}", url);
        self.send(self.client.get(url).bearer_auth(token)).await
    }

    pub async fn post<B, T>(&self, url: &str, token: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!("POST {}", url);
        let request = self
            .client
            .post(url)
            .bearer_auth(token)
            .header("Idempotency-Key", uuid::Uuid::new_v4().to_string())
            .json(body);
        self.send(request).await
    }

    pub async fn patch<B, T>(&self, url: &str, token: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!("PATCH {}", url);
        self.send(self.client.request(Method::PATCH, url).bearer_auth(token).json(body))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, url: &str, token: &str) -> ApiResult<T> {
        tracing::debug!("DELETE {}", url);
        self.send(self.client.delete(url).bearer_auth(token)).await
    }

    /// Unauthenticated POST, used for token exchange
    pub async fn post_anonymous<B, T>(&self, url: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!("POST {}", url);
        self.send(self.client.post(url).json(body)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(error_from_response(status, &body));
        }

        // Empty bodies decode as `{}` so unit-like responses still parse
        let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
        Ok(serde_json::from_str(body)?)
    }
}

/// Build an error from a failed response, preferring the gRPC status body
pub fn error_from_response(status: reqwest::StatusCode, body: &str) -> ApiError {
    match serde_json::from_str::<Status>(body) {
        Ok(parsed) if parsed.code != 0 => ApiError::Status {
            code: parsed.code(),
            message: parsed.message,
        },
        _ => ApiError::Status {
            code: Code::from_http_status(status),
            message: format!("API request failed: {}", status),
        },
    }
}

/// Format an API error for display
/// Keeps the server message, which is safe to show, and adds a hint for common codes
pub fn format_api_error(error: &ApiError) -> String {
    let hint = match error.code() {
        Some(Code::Unauthenticated) => Some("Authentication failed. Check YC_TOKEN or the configured token."),
        Some(Code::PermissionDenied) => Some("Permission denied. Check the service account roles."),
        Some(Code::NotFound) => Some("Resource not found."),
        Some(Code::ResourceExhausted) => Some("Rate limit exceeded. Please try again later."),
        Some(Code::Unavailable) => Some("Service temporarily unavailable. Please try again."),
        _ => None,
    };

    match hint {
        Some(hint) => format!("{} ({})", hint, error),
        None => error.to_string(),
    }
}
