use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use fsp_types::codes;
use fsp_types::metadata::extensions;
use fsp_types::{Envelope, ErrorPayload, FlowStage, InternalData, MessageType};

use crate::activity::{ActivityLauncher, ActivityOutcome, ActivityTracker, LifecycleEvent};
use crate::connection::{ConnectionId, ConnectionShared, ConnectionState};
use crate::error::ServiceError;
use crate::handler::FlowServiceHandler;

/// Handle a request handler uses to answer its client.
///
/// Cloning is cheap; clones refer to the same connection. All terminal
/// operations are one-shot per connection: the first wins, later calls are
/// logged and ignored.
#[derive(Clone)]
pub struct ServiceContext {
    pub(crate) shared: Arc<ConnectionShared>,
    pub(crate) outbound: mpsc::Sender<Envelope>,
    pub(crate) internal_data: InternalData,
    pub(crate) stage: Option<FlowStage>,
    pub(crate) activities: ActivityTracker,
    pub(crate) launcher: Option<Arc<dyn ActivityLauncher>>,
    pub(crate) handler: Arc<dyn FlowServiceHandler>,
}

impl ServiceContext {
    pub fn connection_id(&self) -> ConnectionId {
        self.shared.id()
    }

    /// The flow stage the request was dispatched for, when the caller
    /// declared one.
    pub fn flow_stage(&self) -> Option<FlowStage> {
        self.stage
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether a terminal envelope has already been sent.
    pub fn is_ended(&self) -> bool {
        self.shared.is_ended()
    }

    /// Whether a delegated activity is currently recorded for this
    /// connection.
    pub fn has_delegated_activity(&self) -> bool {
        self.activities.has_activity(&self.shared.id())
    }

    /// Finish with response data, then end the stream.
    pub async fn finish_with_response(&self, response: impl Into<String>) {
        let envelope = Envelope::new(
            MessageType::Response,
            response,
            Some(self.internal_data.clone()),
        );
        self.send_terminal(envelope, ConnectionState::Responded)
            .await;
    }

    /// Finish without passing any response back.
    ///
    /// The preferred way to complete when no response data was generated.
    pub async fn finish_with_no_response(&self) {
        let envelope = Envelope::empty(MessageType::Response, Some(self.internal_data.clone()));
        self.send_terminal(envelope, ConnectionState::Responded)
            .await;
    }

    /// Notify the client that this service keeps processing in the
    /// background and will not send back any response.
    ///
    /// Do not show UI or call any other terminal operation after this.
    pub async fn notify_background_processing(&self) {
        let mut data = self.internal_data.clone();
        data.add_extension(extensions::BACKGROUND_PROCESSING, "true");
        let envelope = Envelope::empty(MessageType::Response, Some(data));
        self.send_terminal(envelope, ConnectionState::Background)
            .await;
    }

    /// Report a failure to the client, then end the stream.
    pub async fn send_error_and_finish(&self, code: impl Into<String>, message: impl Into<String>) {
        let payload = ErrorPayload::new(code, message);
        let envelope = Envelope::new(
            MessageType::Error,
            payload.encode(),
            Some(self.internal_data.clone()),
        );
        self.send_terminal(envelope, ConnectionState::Errored).await;
    }

    /// Hand processing off to a user-facing activity.
    ///
    /// The activity's outcome becomes this connection's terminal send; its
    /// lifecycle events are forwarded to the handler. The activity is
    /// recorded against this connection and force-finished if the client
    /// demands it.
    pub async fn launch_activity(&self, request: impl Into<String>) -> Result<(), ServiceError> {
        let launcher = self
            .launcher
            .clone()
            .ok_or(ServiceError::NoActivityLauncher)?;
        let handle = launcher.launch(self.connection_id(), request.into()).await?;
        let (outcome, lifecycle, finisher) = handle.into_parts();

        self.activities.record(self.connection_id(), finisher);
        debug!(connection_id = %self.connection_id(), "delegated activity launched");

        let ctx = self.clone();
        tokio::spawn(watch_activity(ctx, outcome, lifecycle));
        Ok(())
    }

    /// Force-finish the delegated activity recorded for this connection, if
    /// any.
    pub fn finish_delegated_activities(&self) {
        self.activities.force_finish(&self.shared.id());
    }

    /// Send the terminal envelope followed by END_STREAM. First caller wins.
    async fn send_terminal(&self, envelope: Envelope, next: ConnectionState) {
        if !self.shared.try_end() {
            warn!(
                connection_id = %self.shared.id(),
                attempted = %envelope.message_type(),
                "terminal envelope already sent; ignoring"
            );
            return;
        }
        self.shared.mark(next);
        self.enqueue(envelope).await;
        self.enqueue(Envelope::empty(MessageType::EndStream, None))
            .await;
    }

    /// End the stream with no terminal payload after a force-finish. No-op
    /// when a terminal send already happened.
    pub(crate) async fn end_after_force_finish(&self) {
        if !self.shared.try_end() {
            return;
        }
        self.shared.mark(ConnectionState::ForceFinished);
        self.enqueue(Envelope::empty(MessageType::EndStream, None))
            .await;
    }

    async fn enqueue(&self, envelope: Envelope) {
        if self.outbound.send(envelope).await.is_err() {
            debug!(
                connection_id = %self.shared.id(),
                "connection task gone; dropping outgoing envelope"
            );
        }
    }
}

/// Waits on a delegated activity: forwards lifecycle events to the handler
/// and turns the single outcome into the connection's terminal send.
async fn watch_activity(
    ctx: ServiceContext,
    mut outcome: oneshot::Receiver<ActivityOutcome>,
    mut lifecycle: mpsc::Receiver<LifecycleEvent>,
) {
    let mut lifecycle_open = true;
    let outcome = loop {
        tokio::select! {
            event = lifecycle.recv(), if lifecycle_open => match event {
                Some(event) => {
                    debug!(connection_id = %ctx.connection_id(), ?event, "activity lifecycle event");
                    ctx.handler.on_activity_lifecycle_event(event).await;
                }
                None => lifecycle_open = false,
            },
            result = &mut outcome => break result,
        }
    };

    match outcome {
        Ok(ActivityOutcome::Response(data)) => ctx.finish_with_response(data).await,
        Ok(ActivityOutcome::NoResponse) => ctx.finish_with_no_response().await,
        Ok(ActivityOutcome::Failed { code, message }) => {
            ctx.send_error_and_finish(code, message).await
        }
        Err(_) => {
            warn!(
                connection_id = %ctx.connection_id(),
                "delegated activity dropped without delivering an outcome"
            );
            ctx.send_error_and_finish(
                codes::FLOW_SERVICE_ERROR,
                "delegated activity ended without a result",
            )
            .await;
        }
    }
    ctx.activities.remove(&ctx.connection_id());
}
