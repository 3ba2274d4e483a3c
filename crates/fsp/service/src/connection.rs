use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

/// Identifies one client connection for the lifetime of the service process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of one logical request/response exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Channel attached, no request seen yet.
    Open,
    /// Request received and acknowledged; handler may be running.
    Acked,
    /// Service responded with data.
    Responded,
    /// Service keeps processing in the background; no data will follow.
    Background,
    /// Service reported a failure.
    Errored,
    /// A force-finish interrupted processing.
    ForceFinished,
    /// End-of-stream sent and transport released.
    Closed,
}

/// Per-connection state shared between the communicator task, the handler
/// task and any delegated-activity watcher. Only one terminal transition is
/// ever taken; `try_end` arbitrates between racing terminal senders.
pub(crate) struct ConnectionShared {
    id: ConnectionId,
    state: Mutex<ConnectionState>,
    ended: AtomicBool,
    opened_at: DateTime<Utc>,
}

impl ConnectionShared {
    pub(crate) fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: Mutex::new(ConnectionState::Open),
            ended: AtomicBool::new(false),
            opened_at: Utc::now(),
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock().expect("connection state lock poisoned")
    }

    pub(crate) fn mark(&self, next: ConnectionState) {
        let mut state = self.state.lock().expect("connection state lock poisoned");
        debug!(connection_id = %self.id, from = ?*state, to = ?next, "connection state change");
        *state = next;
    }

    /// Claim the single terminal transition. Returns false when another
    /// sender already ended this connection.
    pub(crate) fn try_end(&self) -> bool {
        !self.ended.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}
