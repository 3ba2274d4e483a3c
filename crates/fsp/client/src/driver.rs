use tracing::debug;

use fsp_transport::{EndpointAddress, TransportHub};
use fsp_types::{Envelope, InternalData, MessageType};

use crate::error::ClientError;
use crate::stream::RequestStream;

/// Open a connection to a service endpoint, send one request and return the
/// resulting event stream.
///
/// The sequence is finite: it terminates on the service's end-of-stream, on
/// a transport failure, or on [`RequestStream::cancel`]. It is restartable
/// only by calling `initiate` again.
pub async fn initiate(
    hub: &TransportHub,
    address: &EndpointAddress,
    payload: impl Into<String>,
    internal_data: InternalData,
) -> Result<RequestStream, ClientError> {
    let channel = hub.connect(address, internal_data.sender_id()).await?;
    let request = Envelope::new(MessageType::Request, payload, Some(internal_data.clone()));
    channel.send(request.encode()).await?;
    debug!(%address, sender_id = %internal_data.sender_id(), "request sent");

    Ok(RequestStream::spawn(channel, internal_data))
}
