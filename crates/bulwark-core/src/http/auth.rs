//! Session token handling
//!
//! The [`TokenStore`] keeps the short-lived session token in session-scoped
//! storage and attaches it as a bearer credential while it is valid. An
//! expired token is purged the first time it is observed and is never
//! attached.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::http::request::RequestDescriptor;
use crate::Result;

/// Default storage key for the serialized token
pub const DEFAULT_TOKEN_KEY: &str = "bulwark.session.token";

/// Session-scoped key/value storage
pub trait SessionStorage: Send + Sync + Debug {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// Process-local storage, discarded with the session
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries().remove(key);
    }
}

/// A short-lived credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub value: String,
    pub issued_at_ms: u64,
    pub ttl_ms: u64,
}

impl SessionToken {
    pub fn new(value: impl Into<String>, issued_at_ms: u64, ttl_ms: u64) -> Self {
        Self {
            value: value.into(),
            issued_at_ms,
            ttl_ms,
        }
    }

    /// `(now - issued_at) > ttl`
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.issued_at_ms) > self.ttl_ms
    }

    pub fn expires_at_ms(&self) -> u64 {
        self.issued_at_ms.saturating_add(self.ttl_ms)
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.expires_at_ms().saturating_sub(now_ms)
    }
}

/// Holds and injects the current session token
#[derive(Debug, Clone)]
pub struct TokenStore {
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
    key: String,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn SessionStorage>, clock: Arc<dyn Clock>) -> Self {
        Self::with_key(storage, clock, DEFAULT_TOKEN_KEY)
    }

    pub fn with_key(
        storage: Arc<dyn SessionStorage>,
        clock: Arc<dyn Clock>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            clock,
            key: key.into(),
        }
    }

    fn identity_key(&self) -> String {
        format!("{}:identity", self.key)
    }

    /// Persist a freshly issued token
    pub fn store(&self, token: &SessionToken) -> Result<()> {
        let raw = serde_json::to_string(token)?;
        self.storage.set(&self.key, raw);
        debug!(expires_at_ms = token.expires_at_ms(), "Session token stored");
        Ok(())
    }

    /// Load the current token, purging it if it has expired
    pub fn read(&self) -> Option<SessionToken> {
        let raw = self.storage.get(&self.key)?;

        let token = match serde_json::from_str::<SessionToken>(&raw) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable session token");
                self.clear();
                return None;
            }
        };

        if token.is_expired(self.clock.now_ms()) {
            debug!(issued_at_ms = token.issued_at_ms, "Session token expired, purging");
            self.clear();
            return None;
        }

        Some(token)
    }

    /// Set the Authorization header when a valid token exists
    pub fn attach(&self, request: &mut RequestDescriptor) -> bool {
        match self.read() {
            Some(token) => {
                request.set_header("Authorization", format!("Bearer {}", token.value));
                true
            }
            None => false,
        }
    }

    /// Remove the token and any cached identity state
    pub fn clear(&self) {
        self.storage.remove(&self.key);
        self.storage.remove(&self.identity_key());
        info!("Session token cleared");
    }

    /// Cache identity details that belong to the current session
    pub fn store_identity(&self, identity: &Value) -> Result<()> {
        self.storage.set(&self.identity_key(), serde_json::to_string(identity)?);
        Ok(())
    }

    pub fn identity(&self) -> Option<Value> {
        self.storage
            .get(&self.identity_key())
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Milliseconds until the current token expires
    pub fn remaining_ms(&self) -> Option<u64> {
        self.read()
            .map(|token| token.remaining_ms(self.clock.now_ms()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn store_at(start_ms: u64) -> (TokenStore, Arc<ManualClock>, Arc<MemorySessionStorage>) {
        let clock = Arc::new(ManualClock::new(start_ms));
        let storage = Arc::new(MemorySessionStorage::new());
        let store = TokenStore::new(storage.clone(), clock.clone());
        (store, clock, storage)
    }

    #[test]
    fn test_expiry_boundary() {
        let token = SessionToken::new("t", 1_000, 500);
        assert!(!token.is_expired(1_500));
        assert!(token.is_expired(1_501));
        assert_eq!(token.remaining_ms(1_200), 300);
    }

    #[test]
    fn test_attach_valid_token() {
        let (store, _clock, _) = store_at(10_000);
        store.store(&SessionToken::new("abc", 10_000, 60_000)).unwrap();

        let mut request = RequestDescriptor::get("/measures");
        assert!(store.attach(&mut request));
        assert_eq!(request.header("authorization"), Some("Bearer abc"));
    }

    #[test]
    fn test_expired_token_is_purged_and_not_attached() {
        let (store, clock, storage) = store_at(0);
        store.store(&SessionToken::new("abc", 0, 1_000)).unwrap();
        store.store_identity(&json!({"user": "ana"})).unwrap();

        clock.advance(1_001);

        let mut request = RequestDescriptor::get("/measures");
        assert!(!store.attach(&mut request));
        assert!(request.header("Authorization").is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_clear_removes_identity() {
        let (store, _clock, storage) = store_at(0);
        store.store(&SessionToken::new("abc", 0, 1_000)).unwrap();
        store.store_identity(&json!({"role": "admin"})).unwrap();
        assert_eq!(store.identity(), Some(json!({"role": "admin"})));

        store.clear();
        assert!(store.read().is_none());
        assert!(store.identity().is_none());
        assert_eq!(storage.len(), 0);
    }

    #[test]
    fn test_corrupt_token_is_discarded() {
        let (store, _clock, storage) = store_at(0);
        storage.set(DEFAULT_TOKEN_KEY, "not json".to_string());

        assert!(store.read().is_none());
        assert!(storage.get(DEFAULT_TOKEN_KEY).is_none());
    }

    #[test]
    fn test_remaining() {
        let (store, clock, _) = store_at(0);
        assert!(store.remaining_ms().is_none());

        store.store(&SessionToken::new("abc", 0, 1_000)).unwrap();
        clock.advance(250);
        assert_eq!(store.remaining_ms(), Some(750));
    }
}
