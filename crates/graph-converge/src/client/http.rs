//! reqwest-backed transport.

use std::time::Duration;

use log::debug;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use super::error::{ApiError, Result};
use super::Transport;

/// Default connect timeout for HTTP requests (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default request timeout for HTTP requests (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum length for error bodies carried into diagnostics.
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Graph-style error envelope: `{ "error": { "code", "message" } }`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn truncate_body(body: &str) -> String {
    if body.len() > MAX_ERROR_BODY_LENGTH {
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    }
}

fn parse_retry_after(value: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Maps a non-success response into an [`ApiError::Status`].
fn status_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ApiError {
    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (
            envelope.error.code.unwrap_or_default(),
            envelope.error.message.unwrap_or_default(),
        ),
        Err(_) => (
            status.canonical_reason().unwrap_or("Unknown").to_string(),
            truncate_body(body),
        ),
    };

    ApiError::Status {
        status: status.as_u16(),
        code,
        message,
        retry_after,
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

/// Transport over HTTPS with bearer authentication.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl HttpTransport {
    /// Creates a transport with the default timeouts.
    pub fn new(base_url: impl Into<String>, token: SecretString) -> Result<Self> {
        Self::with_timeouts(base_url, token, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeouts(
        base_url: impl Into<String>,
        token: SecretString,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Option<Value>> {
        let response = request
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers().get(reqwest::header::RETRY_AFTER));
        let body = response.text().await.map_err(map_reqwest_error)?;

        if !status.is_success() {
            return Err(status_error(status, retry_after, &body));
        }

        if body.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> Result<Value> {
        debug!("GET {}", path);
        self.send(self.client.get(self.url(path)))
            .await?
            .ok_or_else(|| ApiError::Decode(format!("empty response body for GET {}", path)))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        debug!("POST {}", path);
        self.send(self.client.post(self.url(path)).json(body)).await
    }

    async fn patch(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        debug!("PATCH {}", path);
        self.send(self.client.patch(self.url(path)).json(body)).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        debug!("DELETE {}", path);
        self.send(self.client.delete(self.url(path))).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_parses_graph_envelope() {
        let err = status_error(
            StatusCode::FORBIDDEN,
            None,
            r#"{"error":{"code":"Forbidden","message":"Insufficient privileges"}}"#,
        );
        assert_eq!(err, ApiError::status(403, "Forbidden", "Insufficient privileges"));
    }

    #[test]
    fn test_status_error_falls_back_to_reason() {
        let err = status_error(StatusCode::BAD_GATEWAY, None, "<html>bad gateway</html>");
        match err {
            ApiError::Status { status, code, message, .. } => {
                assert_eq!(status, 502);
                assert_eq!(code, "Bad Gateway");
                assert_eq!(message, "<html>bad gateway</html>");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(500);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("... (truncated)"));
        assert!(truncated.len() < 250);
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let transport =
            HttpTransport::new("https://example.test/beta/", SecretString::from("t")).unwrap();
        assert_eq!(transport.url("/deviceManagement/x"), "https://example.test/beta/deviceManagement/x");
    }
}
