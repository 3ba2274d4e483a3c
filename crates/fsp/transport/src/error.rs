use thiserror::Error;

use crate::hub::EndpointAddress;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("address '{address}' already has a live listener")]
    AddressInUse { address: EndpointAddress },

    #[error("no endpoint bound at '{address}'")]
    EndpointNotFound { address: EndpointAddress },

    #[error("endpoint at '{address}' is no longer accepting connections")]
    EndpointGone { address: EndpointAddress },

    #[error("channel closed")]
    Closed,
}
