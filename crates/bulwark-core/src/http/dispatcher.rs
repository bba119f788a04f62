//! The single entry point for outgoing requests
//!
//! Per request: validate locally, run the pipeline's request stages on a
//! private copy of the descriptor, resolve the timeout, then run the
//! transport under the retry engine. A terminal failure goes through the
//! pipeline's failure stages (token purge, event publication) before it is
//! returned to the caller.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cancel::CancellationSignal;
use crate::events::EventBus;
use crate::http::auth::TokenStore;
use crate::http::error::RequestError;
use crate::http::middleware::Pipeline;
use crate::http::request::RequestDescriptor;
use crate::http::retry::{execute_with_retry, RetryPolicy};
use crate::http::timeout::{with_timeout, TimeoutPolicy};
use crate::http::transport::Transport;

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    pipeline: Pipeline,
    timeouts: TimeoutPolicy,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pipeline", &self.pipeline)
            .field("timeouts", &self.timeouts)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl Dispatcher {
    /// Dispatcher with the standard pipeline and default policies
    pub fn new(transport: Arc<dyn Transport>, tokens: TokenStore, bus: EventBus) -> Self {
        Self::with_pipeline(transport, Pipeline::standard(tokens, bus))
    }

    pub fn with_pipeline(transport: Arc<dyn Transport>, pipeline: Pipeline) -> Self {
        Self {
            transport,
            pipeline,
            timeouts: TimeoutPolicy::default(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn timeout_policy(&self) -> &TimeoutPolicy {
        &self.timeouts
    }

    /// Send a request, returning the response body
    pub async fn send(&self, request: &RequestDescriptor) -> Result<Value, RequestError> {
        self.send_with_policy(request, &self.retry_policy, None).await
    }

    /// Send a request that the caller may cancel
    pub async fn send_with_cancel(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationSignal,
    ) -> Result<Value, RequestError> {
        self.send_with_policy(request, &self.retry_policy, Some(cancel))
            .await
    }

    /// Send a request under an explicit retry policy
    pub async fn send_with_policy(
        &self,
        request: &RequestDescriptor,
        policy: &RetryPolicy,
        cancel: Option<&CancellationSignal>,
    ) -> Result<Value, RequestError> {
        request.validate()?;

        let mut prepared = request.clone();
        self.pipeline.prepare(&mut prepared)?;

        let timeout_ms = self.timeouts.resolve(&prepared);
        debug!(
            method = %prepared.method,
            path = %prepared.path,
            timeout_ms,
            "Dispatching request"
        );

        let transport = &self.transport;
        let outgoing = &prepared;
        let result = execute_with_retry(
            || async move {
                let response = with_timeout(
                    transport.execute(outgoing, Duration::from_millis(timeout_ms)),
                    timeout_ms,
                )
                .await?;

                if response.is_success() {
                    Ok(response.body)
                } else {
                    Err(response.into_error())
                }
            },
            policy,
            cancel,
        )
        .await;

        match result {
            Ok(body) => Ok(body),
            Err(mut error) => {
                self.pipeline.fail(&prepared, &mut error);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::{EventKind, ResilienceEvent};
    use crate::http::auth::{MemorySessionStorage, SessionToken};
    use crate::http::error::ErrorKind;
    use crate::http::transport::TransportResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned outcomes and records what it was asked to send
    #[derive(Default)]
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<TransportResponse, RequestError>>>,
        seen: Mutex<Vec<(RequestDescriptor, Duration)>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<TransportResponse, RequestError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn execute(
            &self,
            request: &RequestDescriptor,
            timeout: Duration,
        ) -> Result<TransportResponse, RequestError> {
            self.seen.lock().unwrap().push((request.clone(), timeout));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(TransportResponse::ok(Value::Null)))
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        tokens: TokenStore,
        events: Arc<Mutex<Vec<ResilienceEvent>>>,
    }

    fn fixture(transport: Arc<Scripted>) -> Fixture {
        let tokens = TokenStore::new(
            Arc::new(MemorySessionStorage::new()),
            Arc::new(ManualClock::new(0)),
        );
        tokens.store(&SessionToken::new("tok", 0, 60_000)).unwrap();

        let bus = EventBus::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        bus.subscribe_all(move |event| sink.lock().unwrap().push(event.clone()));

        Fixture {
            dispatcher: Dispatcher::new(transport, tokens.clone(), bus),
            tokens,
            events,
        }
    }

    #[tokio::test]
    async fn test_success_attaches_token_and_timeout() {
        let transport = Scripted::new(vec![Ok(TransportResponse::ok(json!({"id": 1})))]);
        let f = fixture(transport.clone());

        let original = RequestDescriptor::get("/measures");
        let body = f.dispatcher.send(&original).await.unwrap();

        assert_eq!(body, json!({"id": 1}));
        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].0.header("Authorization"), Some("Bearer tok"));
        assert_eq!(seen[0].1, Duration::from_millis(8_000));
        // The caller's descriptor is untouched
        assert!(original.header("Authorization").is_none());
    }

    #[tokio::test]
    async fn test_validation_never_reaches_transport() {
        let transport = Scripted::new(vec![]);
        let f = fixture(transport.clone());

        let err = f
            .dispatcher
            .send(&RequestDescriptor::get("no-slash"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(transport.calls(), 0);
        assert!(f.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_clears_token_without_retry() {
        let transport = Scripted::new(vec![Ok(TransportResponse::new(401, Value::Null))]);
        let f = fixture(transport.clone());

        let err = f
            .dispatcher
            .send(&RequestDescriptor::get("/products"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Auth);
        assert_eq!(transport.calls(), 1);
        assert!(f.tokens.read().is_none());

        let events = f.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::AuthLogout);
    }

    #[tokio::test]
    async fn test_forbidden_carries_server_message() {
        let transport = Scripted::new(vec![Ok(TransportResponse::new(
            403,
            json!({"message": "Only admins can delete providers"}),
        ))]);
        let f = fixture(transport);

        let err = f
            .dispatcher
            .send(&RequestDescriptor::delete("/providers/3"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Permission);
        assert!(f.tokens.read().is_some());
        assert_eq!(
            f.events.lock().unwrap()[0],
            ResilienceEvent::AccessDenied {
                message: "Only admins can delete providers".to_string(),
                status: 403,
            }
        );
    }

    #[tokio::test]
    async fn test_client_error_publishes_nothing() {
        let transport = Scripted::new(vec![Ok(TransportResponse::new(
            422,
            json!({"message": "Name is required"}),
        ))]);
        let f = fixture(transport.clone());

        let err = f
            .dispatcher
            .send(&RequestDescriptor::post("/products", json!({})))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Client);
        assert_eq!(err.message, "Name is required");
        assert_eq!(transport.calls(), 1);
        assert!(f.events.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_after_exhaustion() {
        let transport = Scripted::new(
            (0..4)
                .map(|_| Ok(TransportResponse::new(500, Value::Null)))
                .collect(),
        );
        let f = fixture(transport.clone());

        let err = f
            .dispatcher
            .send(&RequestDescriptor::get("/measures"))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Server);
        assert_eq!(transport.calls(), 4);
        assert_eq!(
            f.events.lock().unwrap().as_slice(),
            &[ResilienceEvent::ServerError {
                message: "Server error (500)".to_string(),
                status: 500,
                will_retry: false,
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_publishes_nothing() {
        let transport = Scripted::new(
            (0..4)
                .map(|_| Err(RequestError::network("reset")))
                .collect(),
        );
        let f = fixture(transport.clone());
        let signal = CancellationSignal::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            trigger.cancel();
        });

        let err = f
            .dispatcher
            .send_with_cancel(&RequestDescriptor::get("/measures"), &signal)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert_eq!(transport.calls(), 2);
        assert!(f.events.lock().unwrap().is_empty());
    }
}
