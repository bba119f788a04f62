//! Ordered request/failure pipeline
//!
//! Stages run in registration order. `on_request` sees the dispatcher's own
//! copy of the descriptor before the first attempt; `on_failure` sees the
//! terminal error after retries have been exhausted or refused. The default
//! pipeline is `[AuthStage, FailureReporter]`, so the token is already gone
//! by the time `auth_logout` subscribers run.

use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

use crate::events::{EventBus, ResilienceEvent};
use crate::http::auth::TokenStore;
use crate::http::error::{ErrorKind, RequestError};
use crate::http::request::RequestDescriptor;

/// One stage of the pipeline
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Transform the outgoing request. An error aborts the dispatch before any I/O.
    fn on_request(&self, _request: &mut RequestDescriptor) -> Result<(), RequestError> {
        Ok(())
    }

    /// Observe, and optionally enrich, a terminal failure
    fn on_failure(&self, _request: &RequestDescriptor, _error: &mut RequestError) {}
}

#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token attachment followed by event reporting
    pub fn standard(tokens: TokenStore, bus: EventBus) -> Self {
        Self::new()
            .with(AuthStage::new(tokens))
            .with(FailureReporter::new(bus))
    }

    pub fn with<M: Middleware + 'static>(mut self, stage: M) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn push(&mut self, stage: Arc<dyn Middleware>) {
        self.stages.push(stage);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn prepare(&self, request: &mut RequestDescriptor) -> Result<(), RequestError> {
        for stage in &self.stages {
            stage.on_request(request)?;
        }
        Ok(())
    }

    pub fn fail(&self, request: &RequestDescriptor, error: &mut RequestError) {
        for stage in &self.stages {
            stage.on_failure(request, error);
        }
    }
}

/// Attaches the session token; purges it when the server rejects the session
#[derive(Debug, Clone)]
pub struct AuthStage {
    tokens: TokenStore,
}

impl AuthStage {
    pub fn new(tokens: TokenStore) -> Self {
        Self { tokens }
    }
}

impl Middleware for AuthStage {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn on_request(&self, request: &mut RequestDescriptor) -> Result<(), RequestError> {
        self.tokens.attach(request);
        Ok(())
    }

    fn on_failure(&self, request: &RequestDescriptor, error: &mut RequestError) {
        if error.kind == ErrorKind::Auth {
            warn!(path = %request.path, "Session rejected by server, clearing token");
            self.tokens.clear();
        }
    }
}

/// Publishes exactly one event per reportable terminal failure
#[derive(Debug, Clone)]
pub struct FailureReporter {
    bus: EventBus,
}

impl FailureReporter {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// The event for a terminal failure, if its kind is reported
    pub fn event_for(error: &RequestError) -> Option<ResilienceEvent> {
        let message = error.message.clone();
        match (error.kind, error.status) {
            (ErrorKind::Auth, _) => Some(ResilienceEvent::AuthLogout { message }),
            (ErrorKind::Permission, status) => Some(ResilienceEvent::AccessDenied {
                message,
                status: status.unwrap_or(403),
            }),
            (ErrorKind::Network, None) => Some(ResilienceEvent::NetworkError { message }),
            (ErrorKind::Server, Some(status)) => Some(ResilienceEvent::ServerError {
                message,
                status,
                // Terminal by the time it is reported
                will_retry: false,
            }),
            _ => None,
        }
    }
}

impl Middleware for FailureReporter {
    fn name(&self) -> &'static str {
        "failure-reporter"
    }

    fn on_failure(&self, request: &RequestDescriptor, failure: &mut RequestError) {
        if let Some(event) = Self::event_for(failure) {
            error!(
                method = %request.method,
                path = %request.path,
                kind = %failure.kind,
                status = ?failure.status,
                "Request failed: {}",
                failure.message
            );
            self.bus.publish(event);
        }
    }
}
