//! Transport primitive
//!
//! A [`Transport`] performs exactly one HTTP exchange. Any response that
//! arrives is returned as `Ok`, whatever its status; `Err` means no response
//! was received. Retrying, token handling and classification live above
//! this seam, so any HTTP library can sit underneath.

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::Client as ReqwestClient;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::http::error::RequestError;
use crate::http::request::RequestDescriptor;
use crate::Result;

/// A received response
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// Parsed JSON, a string for non-JSON bodies, `Null` when empty
    pub body: Value,
    /// Retry-After header in seconds
    pub retry_after: Option<u64>,
}

impl TransportResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            retry_after: None,
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Convert a non-success response into a classified error
    pub fn into_error(self) -> RequestError {
        let text = match &self.body {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        RequestError::from_response(self.status, &text, self.retry_after)
    }
}

/// Performs one HTTP exchange
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: &RequestDescriptor,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, RequestError>;
}

/// Transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
    base_url: Url,
}

impl ReqwestTransport {
    /// `ceiling` bounds every exchange regardless of the per-request timeout
    pub fn new(base_url: &str, ceiling: Duration) -> Result<Self> {
        let base_url = parse_base_url(base_url)?;

        let client = ReqwestClient::builder()
            .timeout(ceiling)
            .build()
            .map_err(|e| crate::Error::HttpClient {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(Box::new(e)),
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join a descriptor path onto the base URL, keeping the base path
    pub fn build_url(&self, path: &str) -> std::result::Result<Url, RequestError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| RequestError::validation(format!("Invalid request path {}: {}", path, e)))
    }

    fn build_request(
        &self,
        request: &RequestDescriptor,
        timeout: Duration,
    ) -> std::result::Result<reqwest::RequestBuilder, RequestError> {
        let url = self.build_url(&request.path)?;
        let mut builder = self
            .client
            .request(request.method.into(), url)
            .timeout(timeout);

        for (key, value) in &request.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| RequestError::validation(format!("Invalid header name: {}", key)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| RequestError::validation(format!("Invalid value for header {}", key)))?;
            builder = builder.header(name, value);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        Ok(builder)
    }
}

/// Parse a base URL, forcing a trailing slash so relative joins append
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }

    let url = Url::parse(&normalized)
        .map_err(|e| crate::Error::config("base_url", format!("Invalid base URL {}: {}", raw, e)))?;

    if url.cannot_be_a_base() {
        return Err(crate::Error::config(
            "base_url",
            format!("Base URL cannot have paths joined onto it: {}", raw),
        ));
    }

    Ok(url)
}

fn from_reqwest_error(error: reqwest::Error) -> RequestError {
    let message = if error.is_timeout() {
        format!("Request timed out: {}", error)
    } else if error.is_connect() {
        format!("Connection failed: {}", error)
    } else {
        error.to_string()
    };
    RequestError::network(message)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: &RequestDescriptor,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, RequestError> {
        let response = self
            .build_request(request, timeout)?
            .send()
            .await
            .map_err(from_reqwest_error)?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());

        let text = response.text().await.map_err(from_reqwest_error)?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(TransportResponse {
            status,
            body,
            retry_after,
        })
    }
}
