//! In-memory read cache with TTL
//!
//! Entries older than the configured TTL are never returned; a stale entry
//! is purged the first time it is looked up. After a mutation the client
//! clears the whole cache, not a scoped subset.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::clock::Clock;

/// Configuration for cache behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum age of a returned entry
    pub ttl_ms: u64,
    /// Maximum cache size (number of entries)
    pub max_entries: usize,
    /// Whether to enable cache
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 300_000,
            max_entries: 1_000,
            enabled: true,
        }
    }
}

/// A cached value and when it was stored
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub stored_at_ms: u64,
}

impl<V> CacheEntry<V> {
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.stored_at_ms)
    }

    pub fn is_stale(&self, now_ms: u64, ttl_ms: u64) -> bool {
        self.age_ms(now_ms) > ttl_ms
    }
}

/// Snapshot of the cache contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    /// Sorted
    pub keys: Vec<String>,
    pub oldest_entry_age_ms: Option<u64>,
    /// Entries past their TTL that no lookup has purged yet
    pub stale_unpurged_count: usize,
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    // Front is least recently used
    access_order: VecDeque<String>,
}

impl<V> CacheState<V> {
    fn touch(&mut self, key: &str) {
        self.forget(key);
        self.access_order.push_back(key.to_string());
    }

    fn forget(&mut self, key: &str) {
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            self.access_order.remove(pos);
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        self.forget(key);
        self.entries.remove(key).is_some()
    }
}

/// Key/value response cache shared by the service layer
pub struct ResponseCache<V = Value> {
    state: Mutex<CacheState<V>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl<V> fmt::Debug for ResponseCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("config", &self.config)
            .field("size", &self.state().entries.len())
            .finish()
    }
}

impl<V> ResponseCache<V> {
    fn state(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                access_order: VecDeque::new(),
            }),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Fresh value for `key`; a stale entry is purged and reported as a miss
    pub fn get(&self, key: &str) -> Option<V> {
        if !self.config.enabled {
            return None;
        }

        let now = self.clock.now_ms();
        let mut state = self.state();

        let stale = state.entries.get(key)?.is_stale(now, self.config.ttl_ms);
        if stale {
            debug!(key, "Purging stale cache entry");
            state.remove(key);
            return None;
        }

        state.touch(key);
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Store a value, evicting the least recently used entry when full
    pub fn set(&self, key: impl Into<String>, value: V) {
        if !self.config.enabled || self.config.max_entries == 0 {
            return;
        }

        let key = key.into();
        let now = self.clock.now_ms();
        let mut state = self.state();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.config.max_entries {
            if let Some(oldest) = state.access_order.pop_front() {
                debug!(key = %oldest, "Evicting least recently used cache entry");
                state.entries.remove(&oldest);
            }
        }

        state.entries.insert(
            key.clone(),
            CacheEntry {
                key: key.clone(),
                value,
                stored_at_ms: now,
            },
        );
        state.touch(&key);
    }

    /// Remove a specific entry from cache
    pub fn delete(&self, key: &str) -> bool {
        self.state().remove(key)
    }

    /// Clear all cache entries
    pub fn clear(&self) {
        let mut state = self.state();
        let size = state.entries.len();
        state.entries.clear();
        state.access_order.clear();
        debug!(cleared = size, "Cache cleared");
    }

    /// Whether a fresh entry exists; does not purge or refresh recency
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        self.state()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_stale(now, self.config.ttl_ms))
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Purge every stale entry, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut state = self.state();

        let expired: Vec<String> = state
            .entries
            .values()
            .filter(|entry| entry.is_stale(now, self.config.ttl_ms))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now_ms();
        let state = self.state();

        let mut keys: Vec<String> = state.entries.keys().cloned().collect();
        keys.sort();

        CacheStats {
            size: state.entries.len(),
            keys,
            oldest_entry_age_ms: state.entries.values().map(|e| e.age_ms(now)).max(),
            stale_unpurged_count: state
                .entries
                .values()
                .filter(|e| e.is_stale(now, self.config.ttl_ms))
                .count(),
        }
    }
}
