use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::connection::ConnectionId;
use crate::error::ServiceError;

const LIFECYCLE_BUFFER: usize = 16;

/// Terminal result of a delegated activity. Exactly one is delivered per
/// launched activity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActivityOutcome {
    /// The activity produced response data for the client.
    Response(String),
    /// The activity finished without producing data.
    NoResponse,
    /// The activity failed; forwarded to the client as an ERROR envelope.
    Failed { code: String, message: String },
}

/// Best-effort lifecycle notifications from a running activity.
///
/// Delivery order against the terminal outcome is only guaranteed for
/// events emitted before the activity completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Created,
    Started,
    Resumed,
    Paused,
    Stopped,
    Destroyed,
}

/// Launches user-facing processing outside the protocol core.
///
/// Implementations bridge to whatever UI machinery hosts the flow; the core
/// only relies on the [`ActivityHandle`] contract.
#[async_trait]
pub trait ActivityLauncher: Send + Sync {
    async fn launch(
        &self,
        connection_id: ConnectionId,
        request: String,
    ) -> Result<ActivityHandle, ServiceError>;
}

/// Core-facing side of a launched activity.
pub struct ActivityHandle {
    outcome: oneshot::Receiver<ActivityOutcome>,
    lifecycle: mpsc::Receiver<LifecycleEvent>,
    finisher: ActivityFinisher,
}

impl ActivityHandle {
    /// Create a handle plus the controller the activity implementation
    /// drives.
    pub fn channel() -> (ActivityHandle, ActivityController) {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (lifecycle_tx, lifecycle_rx) = mpsc::channel(LIFECYCLE_BUFFER);
        let (finish_tx, finish_rx) = mpsc::channel(1);

        let handle = ActivityHandle {
            outcome: outcome_rx,
            lifecycle: lifecycle_rx,
            finisher: ActivityFinisher {
                finish_tx,
                fired: Arc::new(AtomicBool::new(false)),
            },
        };
        let controller = ActivityController {
            outcome: Some(outcome_tx),
            lifecycle: lifecycle_tx,
            finish_requests: finish_rx,
        };
        (handle, controller)
    }

    pub fn finisher(&self) -> ActivityFinisher {
        self.finisher.clone()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        oneshot::Receiver<ActivityOutcome>,
        mpsc::Receiver<LifecycleEvent>,
        ActivityFinisher,
    ) {
        (self.outcome, self.lifecycle, self.finisher)
    }
}

/// Requests that a running activity finish itself.
///
/// Force-finishing fires at most once per activity; if the activity has not
/// already completed it must deliver a terminal outcome promptly.
#[derive(Clone)]
pub struct ActivityFinisher {
    finish_tx: mpsc::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl ActivityFinisher {
    pub fn force_finish(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        // try_send: the activity may already have completed and dropped its
        // receiver, which makes this a no-op.
        let _ = self.finish_tx.try_send(());
    }
}

/// Activity-implementation side of an [`ActivityHandle`].
pub struct ActivityController {
    outcome: Option<oneshot::Sender<ActivityOutcome>>,
    lifecycle: mpsc::Sender<LifecycleEvent>,
    finish_requests: mpsc::Receiver<()>,
}

impl ActivityController {
    /// Deliver the terminal outcome. Returns false if an outcome was already
    /// delivered or the core stopped listening.
    pub fn complete(&mut self, outcome: ActivityOutcome) -> bool {
        match self.outcome.take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Emit a best-effort lifecycle event.
    pub async fn send_lifecycle_event(&self, event: LifecycleEvent) {
        let _ = self.lifecycle.send(event).await;
    }

    /// Wait until the core asks this activity to finish.
    pub async fn finish_requested(&mut self) {
        if self.finish_requests.recv().await.is_none() {
            // Finisher dropped without firing; park until the activity is
            // dropped so callers can keep this in a select arm.
            std::future::pending::<()>().await;
        }
    }
}

/// Map from connection id to the finisher of its delegated activity, owned
/// by the service instance. A connection owns at most one activity at a
/// time and never shares it.
#[derive(Clone, Default)]
pub struct ActivityTracker {
    inner: Arc<Mutex<HashMap<ConnectionId, ActivityFinisher>>>,
}

impl ActivityTracker {
    pub(crate) fn record(&self, connection_id: ConnectionId, finisher: ActivityFinisher) {
        debug!(%connection_id, "delegated activity recorded");
        self.inner
            .lock()
            .expect("activity tracker lock poisoned")
            .insert(connection_id, finisher);
    }

    pub(crate) fn remove(&self, connection_id: &ConnectionId) {
        self.inner
            .lock()
            .expect("activity tracker lock poisoned")
            .remove(connection_id);
    }

    pub fn has_activity(&self, connection_id: &ConnectionId) -> bool {
        self.inner
            .lock()
            .expect("activity tracker lock poisoned")
            .contains_key(connection_id)
    }

    /// Force-finish the activity recorded for a connection. No-op when none
    /// is recorded or it has already finished.
    pub fn force_finish(&self, connection_id: &ConnectionId) {
        let finisher = self
            .inner
            .lock()
            .expect("activity tracker lock poisoned")
            .get(connection_id)
            .cloned();
        if let Some(finisher) = finisher {
            debug!(%connection_id, "force finishing delegated activity");
            finisher.force_finish();
        }
    }
}
