use thiserror::Error;

use fsp_registry::RegistryError;
use fsp_transport::TransportError;

/// Client-side errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The service answered with an ERROR envelope. Unrecognized codes must
    /// be treated as generic failures.
    #[error("service error {code}: {message}")]
    Service { code: String, message: String },

    /// The transport closed before an end-of-stream was received.
    #[error("channel closed unexpectedly before end of stream")]
    ChannelClosed,
}
