//! Typed failure events
//!
//! The resilience layer never drives the UI directly. Terminal failures are
//! published on an [`EventBus`] and presentation code subscribes to the kinds
//! it cares about.
//!
//! Delivery is synchronous and fire-and-forget: handlers registered at the
//! moment of `publish` are called in registration order, late subscribers get
//! no replay, and a panicking handler does not stop delivery to the rest.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, warn};

/// Discriminant of [`ResilienceEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AuthLogout,
    AccessDenied,
    NetworkError,
    ServerError,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AuthLogout => "auth_logout",
            EventKind::AccessDenied => "access_denied",
            EventKind::NetworkError => "network_error",
            EventKind::ServerError => "server_error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal failure notification
///
/// Serializes as `{"kind": "...", "payload": {"message": ..., "status": ..., "willRetry": ...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ResilienceEvent {
    AuthLogout {
        message: String,
    },
    AccessDenied {
        message: String,
        status: u16,
    },
    NetworkError {
        message: String,
    },
    ServerError {
        message: String,
        status: u16,
        will_retry: bool,
    },
}

impl ResilienceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ResilienceEvent::AuthLogout { .. } => EventKind::AuthLogout,
            ResilienceEvent::AccessDenied { .. } => EventKind::AccessDenied,
            ResilienceEvent::NetworkError { .. } => EventKind::NetworkError,
            ResilienceEvent::ServerError { .. } => EventKind::ServerError,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ResilienceEvent::AuthLogout { message }
            | ResilienceEvent::AccessDenied { message, .. }
            | ResilienceEvent::NetworkError { message }
            | ResilienceEvent::ServerError { message, .. } => message,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ResilienceEvent::AccessDenied { status, .. }
            | ResilienceEvent::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

type Handler = Arc<dyn Fn(&ResilienceEvent) + Send + Sync>;

struct Registration {
    id: u64,
    filter: Option<EventKind>,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    registrations: Mutex<Vec<Registration>>,
}

impl BusInner {
    fn registrations(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, id: u64) -> bool {
        let mut registrations = self.registrations();
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }
}

/// Publish/subscribe channel for [`ResilienceEvent`]s
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.inner.registrations().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one kind of event
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&ResilienceEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(handler))
    }

    /// Subscribe to every event
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ResilienceEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(handler))
    }

    fn register(&self, filter: Option<EventKind>, handler: Handler) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.registrations().push(Registration {
            id,
            filter,
            handler,
        });
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to all current subscribers of its kind.
    /// Returns the number of handlers that completed without panicking.
    pub fn publish(&self, event: ResilienceEvent) -> usize {
        let kind = event.kind();
        // Snapshot so handlers may subscribe or unsubscribe while running.
        let handlers: Vec<Handler> = self
            .inner
            .registrations()
            .iter()
            .filter(|r| r.filter.map_or(true, |k| k == kind))
            .map(|r| r.handler.clone())
            .collect();

        debug!(kind = %kind, subscribers = handlers.len(), "Publishing event");

        let mut delivered = 0;
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(kind = %kind, "Event handler panicked"),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .registrations()
            .iter()
            .filter(|r| r.filter.map_or(true, |k| k == kind))
            .count()
    }

    /// Drop every subscription
    pub fn clear(&self) {
        self.inner.registrations().clear();
    }
}

/// Handle returned by `subscribe`; dropping it keeps the subscription alive
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Stop receiving events. Calling this more than once is harmless.
    pub fn unsubscribe(&self) -> bool {
        match self.bus.upgrade() {
            Some(bus) => bus.remove(self.id),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn network(message: &str) -> ResilienceEvent {
        ResilienceEvent::NetworkError {
            message: message.to_string(),
        }
    }

    #[test]
    fn test_delivery_by_kind() {
        let bus = EventBus::new();
        let network_hits = Arc::new(AtomicUsize::new(0));
        let logout_hits = Arc::new(AtomicUsize::new(0));

        let n = network_hits.clone();
        bus.subscribe(EventKind::NetworkError, move |_| {
            n.fetch_add(1, Ordering::SeqCst);
        });
        let l = logout_hits.clone();
        bus.subscribe(EventKind::AuthLogout, move |_| {
            l.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.publish(network("offline")), 1);
        assert_eq!(network_hits.load(Ordering::SeqCst), 1);
        assert_eq!(logout_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let subscription = bus.subscribe(EventKind::NetworkError, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());
        assert_eq!(bus.publish(network("offline")), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventKind::NetworkError, |_| panic!("handler bug"));
        let h = hits.clone();
        bus.subscribe(EventKind::NetworkError, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.publish(network("offline")), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let bus = EventBus::new();
        bus.publish(network("early"));

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        bus.subscribe_all(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(EventKind::ServerError), 1);
    }

    #[test]
    fn test_envelope_shape() {
        let event = ResilienceEvent::ServerError {
            message: "Server error (503)".to_string(),
            status: 503,
            will_retry: false,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "server_error",
                "payload": {"message": "Server error (503)", "status": 503, "willRetry": false}
            })
        );
        assert_eq!(event.status(), Some(503));
        assert_eq!(event.kind().to_string(), "server_error");
    }
}
