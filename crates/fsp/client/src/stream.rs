use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use fsp_transport::Channel;
use fsp_types::{Envelope, ErrorPayload, InternalData, MessageType, VersionComparison, EMPTY_DATA};

use crate::error::ClientError;

const EVENT_BUFFER: usize = 16;

/// One event observed on a request stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowEvent {
    /// The service is alive and about to process the request.
    Ack,
    /// Response data; the last one before the stream ends is the result.
    Response(String),
    /// The service reported a failure. The stream ends right after.
    Error { code: String, message: String },
    /// The transport closed before an end-of-stream was seen. Never treated
    /// as success.
    ChannelClosed,
}

/// Lazy, finite, cancellable sequence of [`FlowEvent`]s for one request.
///
/// The stream ends after the service's end-of-stream, after a
/// [`FlowEvent::ChannelClosed`] failure, or after [`cancel`](Self::cancel).
/// Dropping the stream before it ends cancels the request.
pub struct RequestStream {
    events: mpsc::Receiver<FlowEvent>,
    cancel: Option<oneshot::Sender<()>>,
}

impl RequestStream {
    pub(crate) fn spawn(channel: Channel, internal_data: InternalData) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        tokio::spawn(pump(channel, internal_data, events_tx, cancel_rx));
        Self {
            events: events_rx,
            cancel: Some(cancel_tx),
        }
    }

    /// Abandon the request.
    ///
    /// Best-effort: a FORCE_FINISH envelope is sent if the channel is still
    /// writable, then the channel is closed and the stream stops producing
    /// events. There is no guarantee the service observes the force-finish
    /// before it independently completes; that race is inherent to
    /// asynchronous message delivery.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Receive the next event; `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<FlowEvent> {
        self.events.recv().await
    }

    /// Drain the stream to its terminal event.
    ///
    /// Returns the last response payload (or `None` when the service
    /// finished with the empty-data marker), or the terminal failure.
    pub async fn finish(mut self) -> Result<Option<String>, ClientError> {
        let mut last_response = None;
        while let Some(event) = self.events.recv().await {
            match event {
                FlowEvent::Ack => {}
                FlowEvent::Response(data) => last_response = Some(data),
                FlowEvent::Error { code, message } => {
                    return Err(ClientError::Service { code, message })
                }
                FlowEvent::ChannelClosed => return Err(ClientError::ChannelClosed),
            }
        }
        Ok(last_response.filter(|data| data != EMPTY_DATA))
    }
}

impl Stream for RequestStream {
    type Item = FlowEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for RequestStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Reads envelopes off the channel and translates them into events until a
/// terminal condition or cancellation.
async fn pump(
    mut channel: Channel,
    internal_data: InternalData,
    events: mpsc::Sender<FlowEvent>,
    mut cancel: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut cancel => {
                let force_finish =
                    Envelope::empty(MessageType::ForceFinish, Some(internal_data.clone()));
                if channel.send(force_finish.encode()).await.is_err() {
                    debug!("channel no longer writable during cancel");
                }
                channel.close();
                debug!("request cancelled");
                return;
            }
            incoming = channel.recv() => {
                let Some(raw) = incoming else {
                    warn!("channel closed without end of stream");
                    let _ = events.send(FlowEvent::ChannelClosed).await;
                    return;
                };
                let envelope = match Envelope::decode(&raw) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        warn!(%err, "ignoring malformed envelope from service");
                        continue;
                    }
                };
                log_version_check(&internal_data, envelope.internal_data());

                let event = match envelope.message_type() {
                    MessageType::Ack => {
                        debug!("request acknowledged");
                        FlowEvent::Ack
                    }
                    MessageType::Response => {
                        FlowEvent::Response(envelope.message_data().to_string())
                    }
                    MessageType::Error => {
                        let payload = ErrorPayload::decode_lossy(envelope.message_data());
                        FlowEvent::Error {
                            code: payload.code,
                            message: payload.message,
                        }
                    }
                    MessageType::EndStream => {
                        debug!("end of stream");
                        channel.close();
                        return;
                    }
                    other => {
                        warn!(message_type = %other, "unexpected message type from service");
                        continue;
                    }
                };
                if events.send(event).await.is_err() {
                    // Consumer gone without cancelling; release the channel.
                    channel.close();
                    return;
                }
            }
        }
    }
}

fn log_version_check(ours: &InternalData, theirs: Option<&InternalData>) {
    match VersionComparison::check(ours, theirs) {
        VersionComparison::Match => {}
        VersionComparison::UnknownSender => {
            info!(ours = %ours.api_version(), "service API version is unknown");
        }
        VersionComparison::MinorDifference { ours, theirs } => {
            info!(%ours, %theirs, "service API version differs");
        }
        VersionComparison::MajorDifference { ours, theirs } => {
            warn!(%ours, %theirs, "service API major version differs");
        }
        VersionComparison::Unparseable { ours, theirs } => {
            warn!(%ours, %theirs, "API version not parseable");
        }
    }
}
