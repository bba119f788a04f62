//! Request execution
//!
//! This module provides the resilient request path:
//! - Request descriptors and local validation
//! - Per-category timeouts
//! - Error classification into a closed taxonomy
//! - Retry with exponential backoff
//! - Session token attachment and purging
//! - A middleware pipeline around a pluggable transport

pub mod auth;
pub mod dispatcher;
pub mod error;
pub mod middleware;
pub mod request;
pub mod retry;
pub mod timeout;
pub mod transport;

pub use auth::{MemorySessionStorage, SessionStorage, SessionToken, TokenStore, DEFAULT_TOKEN_KEY};
pub use dispatcher::Dispatcher;
pub use error::{ErrorKind, RequestError};
pub use middleware::{AuthStage, FailureReporter, Middleware, Pipeline};
pub use request::{HttpMethod, RequestDescriptor};
pub use retry::{execute_with_retry, RetryDecision, RetryHandler, RetryPolicy};
pub use timeout::{with_timeout, TimeoutCategory, TimeoutPolicy, TimeoutTable};
pub use transport::{ReqwestTransport, Transport, TransportResponse};
