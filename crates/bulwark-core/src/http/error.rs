//! Request error classification
//!
//! Every failed request resolves to a [`RequestError`] carrying one
//! [`ErrorKind`]. Retry eligibility, event publication and token purging are
//! all decided from the kind and status code, never from message text.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Classification of request failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected locally before any network I/O
    Validation,
    /// 401 - the session is no longer valid
    Auth,
    /// 403 - authenticated but not allowed
    Permission,
    /// Any other 4xx (and unexpected non-success statuses)
    Client,
    /// No response was received (connect failure, timeout, reset)
    Network,
    /// 5xx
    Server,
    /// The caller cancelled the operation
    Cancelled,
}

impl ErrorKind {
    /// Classify a non-success HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::Auth,
            403 => ErrorKind::Permission,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Client,
        }
    }

    /// Kinds the retry engine may recover from by retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Server)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::Permission => "permission",
            ErrorKind::Client => "client",
            ErrorKind::Network => "network",
            ErrorKind::Server => "server",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized request error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestError {
    /// Error classification
    pub kind: ErrorKind,
    /// HTTP status code, absent when no response was received
    pub status: Option<u16>,
    /// Human-readable message, preferring the server-provided one
    pub message: String,
    /// Parsed response body, if it was JSON
    pub details: Option<Value>,
    /// Retry-After header value in seconds, if present
    pub retry_after: Option<u64>,
}

impl RequestError {
    pub fn new(kind: ErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    /// Local pre-flight rejection
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, None, message)
    }

    /// Transport failure with no response
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, None, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, None, "Request was cancelled")
    }

    /// Transport-level timeout; treated as a failure with no response
    pub fn timed_out(timeout_ms: u64) -> Self {
        Self::network(format!("Request timed out after {}ms", timeout_ms))
    }

    /// Build from a non-success response
    pub fn from_response(status: u16, body: &str, retry_after: Option<u64>) -> Self {
        let details = serde_json::from_str::<Value>(body).ok();
        let message = Self::extract_server_message(details.as_ref(), body)
            .unwrap_or_else(|| default_status_message(status));

        Self {
            kind: ErrorKind::from_status(status),
            status: Some(status),
            message,
            details,
            retry_after,
        }
    }

    /// Attach a parsed body
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Pull a message out of the common JSON error shapes
    fn extract_server_message(details: Option<&Value>, body: &str) -> Option<String> {
        if let Some(json) = details {
            if let Some(message) = json.get("message").and_then(Value::as_str) {
                return Some(message.to_string());
            }

            match json.get("error") {
                Some(Value::String(message)) => return Some(message.clone()),
                Some(error) => {
                    if let Some(message) = error.get("message").and_then(Value::as_str) {
                        return Some(message.to_string());
                    }
                }
                None => {}
            }

            if let Some(detail) = json.get("detail").and_then(Value::as_str) {
                return Some(detail.to_string());
            }

            return None;
        }

        let trimmed = body.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// True when no response was received
    pub fn is_network(&self) -> bool {
        self.status.is_none() && self.kind == ErrorKind::Network
    }
}

fn default_status_message(status: u16) -> String {
    match status {
        401 => "Session expired, please sign in again".to_string(),
        403 => "You do not have permission to perform this action".to_string(),
        404 => "Resource not found".to_string(),
        500..=599 => format!("Server error ({})", status),
        _ => format!("Request failed with status {}", status),
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error [{}]: {}",
            self.kind,
            self.status
                .map(|c| c.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            self.message
        )
    }
}

impl std::error::Error for RequestError {}
