use std::any::Any;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use fsp_types::codes;
use fsp_types::metadata::extensions;
use fsp_types::{Envelope, FlowStage, InternalData, MessageType, VersionComparison};

use fsp_transport::{Channel, IncomingConnection};

use crate::activity::{ActivityLauncher, ActivityTracker};
use crate::connection::{ConnectionId, ConnectionShared, ConnectionState};
use crate::context::ServiceContext;
use crate::fault::FaultReporter;
use crate::handler::FlowServiceHandler;

/// Binds one accepted client channel to protocol behavior.
///
/// The communicator owns the channel: it drains incoming envelopes and
/// relays outgoing ones from handler contexts, so a FORCE_FINISH is
/// deliverable while a handler is still processing. It guarantees the ACK
/// is on the wire before the handler starts and that exactly one terminal
/// envelope reaches the client however the handler behaves.
pub(crate) struct ClientCommunicator {
    shared: Arc<ConnectionShared>,
    caller_id: String,
    channel: Channel,
    internal_data: InternalData,
    handler: Arc<dyn FlowServiceHandler>,
    launcher: Option<Arc<dyn ActivityLauncher>>,
    fault: Arc<dyn FaultReporter>,
    activities: ActivityTracker,
    outbound_tx: mpsc::Sender<Envelope>,
    outbound_rx: mpsc::Receiver<Envelope>,
    eos_tx: mpsc::Sender<ConnectionId>,
}

impl ClientCommunicator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        connection: IncomingConnection,
        internal_data: InternalData,
        capacity: usize,
        handler: Arc<dyn FlowServiceHandler>,
        launcher: Option<Arc<dyn ActivityLauncher>>,
        fault: Arc<dyn FaultReporter>,
        activities: ActivityTracker,
        eos_tx: mpsc::Sender<ConnectionId>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        Self {
            shared: Arc::new(ConnectionShared::new(ConnectionId::new())),
            caller_id: connection.caller_id,
            channel: connection.channel,
            internal_data,
            handler,
            launcher,
            fault,
            activities,
            outbound_tx,
            outbound_rx,
            eos_tx,
        }
    }

    pub(crate) async fn run(mut self) {
        let connection_id = self.shared.id();
        debug!(%connection_id, caller_id = %self.caller_id, "client connected");

        loop {
            tokio::select! {
                outgoing = self.outbound_rx.recv() => {
                    // We hold a sender for new contexts, so this is always Some.
                    let Some(envelope) = outgoing else { break };
                    let is_end = envelope.message_type() == MessageType::EndStream;
                    if self.channel.send(envelope.encode()).await.is_err() {
                        debug!(%connection_id, "client channel closed while sending");
                        break;
                    }
                    if is_end {
                        debug!(%connection_id, "end of stream sent");
                        break;
                    }
                }
                incoming = self.channel.recv() => {
                    match incoming {
                        Some(raw) => self.on_message(raw).await,
                        None => {
                            debug!(%connection_id, "client channel closed");
                            break;
                        }
                    }
                }
            }
        }

        self.channel.close();
        self.shared.mark(ConnectionState::Closed);
        let elapsed_ms = (Utc::now() - self.shared.opened_at()).num_milliseconds();
        debug!(%connection_id, elapsed_ms, "connection closed");
        let _ = self.eos_tx.send(connection_id).await;
    }

    async fn on_message(&mut self, raw: String) {
        let connection_id = self.shared.id();
        let envelope = match Envelope::decode(&raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                // Decode failures may be non-fatal transport noise; keep the
                // channel open and wait for the next message.
                warn!(%connection_id, %err, "ignoring malformed message");
                return;
            }
        };

        self.log_version_check(envelope.internal_data());

        match envelope.message_type() {
            MessageType::Request => self.on_request(envelope).await,
            MessageType::ForceFinish => self.on_force_finish().await,
            other => {
                warn!(%connection_id, message_type = %other, "invalid message type from client");
                self.make_context(None)
                    .send_error_and_finish(
                        codes::INVALID_MESSAGE_TYPE,
                        format!("message type {other} is not valid here"),
                    )
                    .await;
            }
        }
    }

    async fn on_request(&mut self, envelope: Envelope) {
        let connection_id = self.shared.id();
        if self.shared.state() != ConnectionState::Open {
            warn!(%connection_id, "request received on a connection that already has one");
            self.make_context(None)
                .send_error_and_finish(
                    codes::INVALID_MESSAGE_TYPE,
                    "connection already carries a request",
                )
                .await;
            return;
        }

        let stage = envelope
            .internal_data()
            .and_then(|data| data.extension(extensions::FLOW_STAGE))
            .and_then(|raw| raw.parse::<FlowStage>().ok());

        self.shared.mark(ConnectionState::Acked);
        let ack = Envelope::empty(MessageType::Ack, Some(self.internal_data.clone()));
        if self.channel.send(ack.encode()).await.is_err() {
            debug!(%connection_id, "client gone before ack");
            return;
        }
        debug!(%connection_id, stage = ?stage, "request acknowledged");

        let ctx = self.make_context(stage);
        let request = envelope.message_data().to_string();
        let sender = envelope.internal_data().cloned();
        let handler = self.handler.clone();
        let fault = self.fault.clone();

        tokio::spawn(async move {
            let result = std::panic::AssertUnwindSafe(handler.process_request(
                ctx.clone(),
                request,
                sender,
            ))
            .catch_unwind()
            .await;

            match result {
                Ok(Ok(())) => {
                    if !ctx.is_ended() && !ctx.has_delegated_activity() {
                        warn!(
                            connection_id = %ctx.connection_id(),
                            "handler returned without a terminal send; finishing with no response"
                        );
                        ctx.finish_with_no_response().await;
                    }
                }
                Ok(Err(err)) => {
                    let description = err.to_string();
                    ctx.send_error_and_finish(codes::SERVICE_EXCEPTION, description.as_str())
                        .await;
                    fault.report(ctx.connection_id(), &description);
                }
                Err(panic) => {
                    let description = panic_description(panic);
                    ctx.send_error_and_finish(codes::SERVICE_EXCEPTION, description.as_str())
                        .await;
                    fault.report(ctx.connection_id(), &description);
                }
            }
        });
    }

    async fn on_force_finish(&mut self) {
        let connection_id = self.shared.id();
        info!(%connection_id, "force finish requested");

        let ctx = self.make_context(None);
        self.handler.on_force_finish(&ctx).await;
        self.activities.force_finish(&connection_id);
        ctx.end_after_force_finish().await;
    }

    fn make_context(&self, stage: Option<FlowStage>) -> ServiceContext {
        ServiceContext {
            shared: self.shared.clone(),
            outbound: self.outbound_tx.clone(),
            internal_data: self.internal_data.clone(),
            stage,
            activities: self.activities.clone(),
            launcher: self.launcher.clone(),
            handler: self.handler.clone(),
        }
    }

    fn log_version_check(&self, theirs: Option<&InternalData>) {
        match VersionComparison::check(&self.internal_data, theirs) {
            VersionComparison::Match => {}
            VersionComparison::UnknownSender => {
                info!(ours = %self.internal_data.api_version(), "sender API version is unknown");
            }
            VersionComparison::MinorDifference { ours, theirs } => {
                info!(%ours, %theirs, "sender API version differs");
            }
            VersionComparison::MajorDifference { ours, theirs } => {
                warn!(%ours, %theirs, "sender API major version differs");
            }
            VersionComparison::Unparseable { ours, theirs } => {
                warn!(%ours, %theirs, "API version not parseable");
            }
        }
    }
}

fn panic_description(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "request handler panicked".to_string()
    }
}
