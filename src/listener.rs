//! Listener fan-out: connection, request-sent, and response-received
//! notification channels.
//!
//! Listener sets are copy-on-write: a snapshot `Vec` is cloned out from
//! behind the registry lock and callbacks are invoked outside it, so a
//! listener calling back into the session (e.g. to `send` another body)
//! cannot deadlock against the coordinator's own lock. Per-listener
//! invocation order matches registration order; no ordering is promised
//! across distinct listeners notified for the same event.

use crate::body::Body;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Emitted on the connection channel.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The session's CM parameters were just materialized.
    Established,
    /// The session was disposed. `cause` is `Some` when disposal was
    /// triggered by an error rather than an application-initiated `close`.
    /// `pending_request_acks` carries the bodies that were sent but never
    /// acknowledged, so an application can replay them onto a fresh session.
    Closed {
        cause: Option<String>,
        pending_request_acks: Vec<Body>,
    },
}

/// Opaque handle returned by `add_*`, used to `remove_*` later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ConnectionFn = dyn Fn(ConnectionEvent) + Send + Sync;
type BodyFn = dyn Fn(&Body) + Send + Sync;

struct Registry<F: ?Sized> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerId, Arc<F>)>>,
}

impl<F: ?Sized> Default for Registry<F> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<F: ?Sized> Registry<F> {
    fn add(&self, f: Arc<F>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.entries.write().unwrap().push((id, f));
        id
    }

    fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Snapshot the current listeners for lock-free invocation.
    fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect()
    }
}

/// The three listener channels for a session.
#[derive(Default)]
pub struct Listeners {
    connection: Registry<ConnectionFn>,
    request_sent: Registry<BodyFn>,
    response_received: Registry<BodyFn>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_connection_listener<F>(&self, f: F) -> ListenerId
    where
        F: Fn(ConnectionEvent) + Send + Sync + 'static,
    {
        self.connection.add(Arc::new(f))
    }

    pub fn remove_connection_listener(&self, id: ListenerId) -> bool {
        self.connection.remove(id)
    }

    pub fn add_request_sent_listener<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Body) + Send + Sync + 'static,
    {
        self.request_sent.add(Arc::new(f))
    }

    pub fn remove_request_sent_listener(&self, id: ListenerId) -> bool {
        self.request_sent.remove(id)
    }

    pub fn add_response_received_listener<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&Body) + Send + Sync + 'static,
    {
        self.response_received.add(Arc::new(f))
    }

    pub fn remove_response_received_listener(&self, id: ListenerId) -> bool {
        self.response_received.remove(id)
    }

    /// Fire all connection listeners. Must be called outside the
    /// coordinator's lock. Panics from a listener are caught and logged,
    /// never propagated (a misbehaving listener must not affect coordinator
    /// state).
    pub fn notify_connection(&self, event: ConnectionEvent) {
        for listener in self.connection.snapshot() {
            let event = event.clone();
            if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(event))) {
                tracing::error!(?panic, "connection listener panicked, ignoring");
            }
        }
    }

    /// Fire all request-sent listeners. Must be called outside the lock.
    pub fn notify_request_sent(&self, body: &Body) {
        for listener in self.request_sent.snapshot() {
            if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(body))) {
                tracing::error!(?panic, "request-sent listener panicked, ignoring");
            }
        }
    }

    /// Fire all response-received listeners. Must be called outside the lock.
    pub fn notify_response_received(&self, body: &Body) {
        for listener in self.response_received.snapshot() {
            if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(body))) {
                tracing::error!(?panic, "response-received listener panicked, ignoring");
            }
        }
    }
}
