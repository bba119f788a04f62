//! Bounded-concurrency batch execution
//!
//! Requests are split into consecutive windows of `concurrency` items. Every
//! item of a window starts together and the whole window settles before the
//! next one starts. Results are stored by submission index, so completion
//! order never shows in the output.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cancel::CancellationSignal;
use crate::http::{Dispatcher, ErrorKind, RequestDescriptor, RequestError, RetryPolicy};

/// Options for one batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchOptions {
    /// Window size
    pub concurrency: usize,
    /// Reject the whole run on the first failure
    #[serde(alias = "fail_fast")]
    pub fail_fast: bool,
    /// Run each item under the dispatcher's retry policy; otherwise one attempt
    #[serde(alias = "retry_failures")]
    pub retry_failures: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            fail_fast: false,
            retry_failures: true,
        }
    }
}

impl BatchOptions {
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.concurrency == 0 {
            return Err(RequestError::validation("Batch concurrency must be at least 1"));
        }
        Ok(())
    }
}

/// A failed item, tagged with its submission index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchError {
    pub index: usize,
    pub error: RequestError,
}

/// Per-item view of a batch outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub index: usize,
    pub result: Option<Value>,
    pub error: Option<RequestError>,
}

/// Aggregated results of a run without `fail_fast`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    /// `results[i]` is the body of request `i`, `None` if it failed
    pub results: Vec<Option<Value>>,
    /// Failures in submission order
    pub errors: Vec<BatchError>,
}

impl BatchOutcome {
    fn with_len(len: usize) -> Self {
        Self {
            results: vec![None; len],
            errors: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// One entry per submitted request, in submission order
    pub fn items(&self) -> Vec<BatchItem> {
        self.results
            .iter()
            .enumerate()
            .map(|(index, result)| BatchItem {
                index,
                result: result.clone(),
                error: self
                    .errors
                    .iter()
                    .find(|e| e.index == index)
                    .map(|e| e.error.clone()),
            })
            .collect()
    }
}

/// Runs many requests through one dispatcher
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    dispatcher: Arc<Dispatcher>,
}

impl BatchExecutor {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Execute `requests` window by window.
    ///
    /// Returns `Err` for invalid options, for cancellation, and, with
    /// `fail_fast`, for the first item failure. Later windows never start
    /// once the run has been rejected.
    pub async fn run(
        &self,
        requests: &[RequestDescriptor],
        options: &BatchOptions,
        cancel: Option<&CancellationSignal>,
    ) -> Result<BatchOutcome, RequestError> {
        options.validate()?;

        let policy = if options.retry_failures {
            self.dispatcher.policy().clone()
        } else {
            RetryPolicy::no_retries()
        };

        let mut outcome = BatchOutcome::with_len(requests.len());

        for (window, chunk) in requests.chunks(options.concurrency).enumerate() {
            if cancel.is_some_and(|signal| signal.is_cancelled()) {
                return Err(RequestError::cancelled());
            }

            let offset = window * options.concurrency;
            debug!(window, size = chunk.len(), "Starting batch window");

            let mut in_flight: FuturesUnordered<_> = chunk
                .iter()
                .enumerate()
                .map(|(i, request)| {
                    let policy = &policy;
                    async move {
                        let result = self
                            .dispatcher
                            .send_with_policy(request, policy, cancel)
                            .await;
                        (offset + i, result)
                    }
                })
                .collect();

            while let Some((index, result)) = in_flight.next().await {
                match result {
                    Ok(body) => outcome.results[index] = Some(body),
                    Err(error) if error.kind == ErrorKind::Cancelled => return Err(error),
                    Err(error) if options.fail_fast => {
                        warn!(index, error = %error, "Batch item failed, aborting run");
                        return Err(error);
                    }
                    Err(error) => outcome.errors.push(BatchError { index, error }),
                }
            }
        }

        outcome.errors.sort_by_key(|e| e.index);
        debug!(
            total = requests.len(),
            failed = outcome.errors.len(),
            "Batch finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::EventBus;
    use crate::http::{MemorySessionStorage, TokenStore, Transport, TransportResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echoes the path back after a path-dependent delay; `/fail/*` answers 500
    #[derive(Default)]
    struct Echo {
        started: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Echo {
        async fn execute(
            &self,
            request: &RequestDescriptor,
            _timeout: Duration,
        ) -> Result<TransportResponse, RequestError> {
            self.started.lock().unwrap().push(request.path.clone());
            let n: u64 = request
                .path
                .rsplit('/')
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            // Later items finish first
            tokio::time::sleep(Duration::from_millis(100 - n * 10)).await;

            if request.path.starts_with("/fail/") {
                Ok(TransportResponse::new(500, Value::Null))
            } else {
                Ok(TransportResponse::ok(json!({ "path": request.path })))
            }
        }
    }

    fn executor(transport: Arc<Echo>) -> BatchExecutor {
        let tokens = TokenStore::new(
            Arc::new(MemorySessionStorage::new()),
            Arc::new(ManualClock::new(0)),
        );
        BatchExecutor::new(Arc::new(Dispatcher::new(transport, tokens, EventBus::new())))
    }

    fn paths(paths: &[&str]) -> Vec<RequestDescriptor> {
        paths.iter().map(|p| RequestDescriptor::get(*p)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_submission_order() {
        let transport = Arc::new(Echo::default());
        let requests: Vec<_> = (0..7)
            .map(|i| RequestDescriptor::get(format!("/items/{}", i)))
            .collect();
        let options = BatchOptions {
            concurrency: 3,
            ..Default::default()
        };

        let outcome = executor(transport).run(&requests, &options, None).await.unwrap();

        assert_eq!(outcome.results.len(), 7);
        for (i, result) in outcome.results.iter().enumerate() {
            assert_eq!(result, &Some(json!({ "path": format!("/items/{}", i) })));
        }
        assert!(outcome.is_complete_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_is_collected() {
        let transport = Arc::new(Echo::default());
        let requests = paths(&["/items/0", "/fail/1", "/items/2"]);
        let options = BatchOptions {
            retry_failures: false,
            ..Default::default()
        };

        let outcome = executor(transport.clone())
            .run(&requests, &options, None)
            .await
            .unwrap();

        assert_eq!(outcome.succeeded(), 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].index, 1);
        assert_eq!(outcome.errors[0].error.kind, ErrorKind::Server);
        // One attempt only
        assert_eq!(transport.started.lock().unwrap().len(), 3);

        let items = outcome.items();
        assert!(items[1].result.is_none());
        assert!(items[1].error.is_some());
        assert!(items[2].error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_skips_later_windows() {
        let transport = Arc::new(Echo::default());
        let requests = paths(&["/items/0", "/fail/1", "/items/2", "/items/3"]);
        let options = BatchOptions {
            concurrency: 2,
            fail_fast: true,
            retry_failures: false,
        };

        let err = executor(transport.clone())
            .run(&requests, &options, None)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Server);
        let mut started = transport.started.lock().unwrap().clone();
        started.sort();
        assert_eq!(started, vec!["/fail/1".to_string(), "/items/0".to_string()]);
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let transport = Arc::new(Echo::default());
        let options = BatchOptions {
            concurrency: 0,
            ..Default::default()
        };

        let err = executor(transport.clone())
            .run(&paths(&["/items/0"]), &options, None)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(transport.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let transport = Arc::new(Echo::default());
        let signal = CancellationSignal::new();
        signal.cancel();

        let err = executor(transport.clone())
            .run(&paths(&["/items/0"]), &BatchOptions::default(), Some(&signal))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert!(transport.started.lock().unwrap().is_empty());
    }

    #[test]
    fn test_options_accept_both_spellings() {
        let camel: BatchOptions = serde_json::from_str(r#"{"failFast": true}"#).unwrap();
        let snake: BatchOptions = serde_json::from_str(r#"{"fail_fast": true}"#).unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.concurrency, 5);
        assert!(camel.retry_failures);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let outcome = executor(Arc::new(Echo::default()))
            .run(&[], &BatchOptions::default(), None)
            .await
            .unwrap();
        assert!(outcome.results.is_empty());
        assert!(outcome.errors.is_empty());
    }
}
