//! Client facade
//!
//! [`BulwarkClient`] owns one instance of every service (token store, cache,
//! event bus, dispatcher, batch executor) and wires them from a
//! [`ClientConfig`]. Screens hold a client and never construct services
//! themselves.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::batch::{BatchExecutor, BatchOptions, BatchOutcome};
use crate::cache::ResponseCache;
use crate::cancel::CancellationSignal;
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::events::EventBus;
use crate::http::{
    Dispatcher, MemorySessionStorage, ReqwestTransport, RequestDescriptor, RequestError,
    SessionStorage, SessionToken, TimeoutPolicy, TokenStore, Transport,
};
use crate::Result;

#[derive(Debug)]
pub struct BulwarkClient {
    config: ClientConfig,
    clock: Arc<dyn Clock>,
    tokens: TokenStore,
    cache: Arc<ResponseCache>,
    events: EventBus,
    dispatcher: Arc<Dispatcher>,
    batch: BatchExecutor,
}

impl BulwarkClient {
    /// Client over HTTP with in-memory session storage and the system clock
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let ceiling = Duration::from_millis(config.timeouts.max_ms());
        let transport = Arc::new(ReqwestTransport::new(&config.base_url, ceiling)?);
        Self::with_parts(
            config,
            transport,
            Arc::new(MemorySessionStorage::new()),
            Arc::new(SystemClock),
        )
    }

    /// Client built from the environment (see [`ClientConfig::from_env`])
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Client over caller-supplied collaborators
    pub fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn SessionStorage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let tokens = TokenStore::with_key(storage, clock.clone(), config.token_storage_key.clone());
        let cache = Arc::new(ResponseCache::new(config.cache.clone(), clock.clone()));
        let events = EventBus::new();

        let dispatcher = Arc::new(
            Dispatcher::new(transport, tokens.clone(), events.clone())
                .timeouts(TimeoutPolicy::new(config.timeouts.clone()))
                .retry_policy(config.retry.clone()),
        );
        let batch = BatchExecutor::new(dispatcher.clone());

        debug!(base_url = %config.base_url, "Client initialized");

        Ok(Self {
            config,
            clock,
            tokens,
            cache,
            events,
            dispatcher,
            batch,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn send(&self, request: &RequestDescriptor) -> std::result::Result<Value, RequestError> {
        self.dispatcher.send(request).await
    }

    pub async fn send_with_cancel(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationSignal,
    ) -> std::result::Result<Value, RequestError> {
        self.dispatcher.send_with_cancel(request, cancel).await
    }

    /// Read through the cache: a fresh entry under `key` is returned without
    /// dispatching; otherwise the response is stored under `key`.
    pub async fn fetch_cached(
        &self,
        key: &str,
        request: &RequestDescriptor,
    ) -> std::result::Result<Value, RequestError> {
        if let Some(hit) = self.cache.get(key) {
            debug!(key, "Cache hit");
            return Ok(hit);
        }

        let body = self.dispatcher.send(request).await?;
        self.cache.set(key, body.clone());
        Ok(body)
    }

    /// Send a create/update/delete/toggle request and clear the whole cache
    /// once it succeeds
    pub async fn mutate(&self, request: &RequestDescriptor) -> std::result::Result<Value, RequestError> {
        if !request.method.is_mutation() {
            return Err(RequestError::validation(format!(
                "{} is not a mutation method",
                request.method
            )));
        }

        let body = self.dispatcher.send(request).await?;
        self.cache.clear();
        Ok(body)
    }

    /// Run a batch with the configured default options
    pub async fn run_batch(
        &self,
        requests: &[RequestDescriptor],
        cancel: Option<&CancellationSignal>,
    ) -> std::result::Result<BatchOutcome, RequestError> {
        self.batch.run(requests, &self.config.batch, cancel).await
    }

    pub async fn run_batch_with(
        &self,
        requests: &[RequestDescriptor],
        options: &BatchOptions,
        cancel: Option<&CancellationSignal>,
    ) -> std::result::Result<BatchOutcome, RequestError> {
        self.batch.run(requests, options, cancel).await
    }

    /// Start a session with a freshly issued token
    pub fn login(&self, token: &SessionToken) -> Result<()> {
        self.tokens.store(token)?;
        info!(expires_at_ms = token.expires_at_ms(), "Session started");
        Ok(())
    }

    /// Start a session from a raw token value issued now
    pub fn login_with_value(&self, value: impl Into<String>, ttl_ms: u64) -> Result<()> {
        self.login(&SessionToken::new(value, self.clock.now_ms(), ttl_ms))
    }

    /// End the session locally. No `auth_logout` event is published; that
    /// event is reserved for sessions the server rejected.
    pub fn logout(&self) {
        self.tokens.clear();
        self.cache.clear();
        info!("Logged out");
    }

    /// Tear down all session state, including event subscriptions
    pub fn reset(&self) {
        self.tokens.clear();
        self.cache.clear();
        self.events.clear();
        info!("Client reset");
    }
}
