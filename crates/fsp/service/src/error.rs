use thiserror::Error;

use fsp_transport::TransportError;

/// Service-side errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no activity launcher configured for this service")]
    NoActivityLauncher,

    #[error("activity launch failed: {detail}")]
    ActivityLaunch { detail: String },

    #[error("{0}")]
    Handler(String),
}

impl ServiceError {
    /// Wrap a handler-specific failure message.
    pub fn handler(message: impl Into<String>) -> Self {
        ServiceError::Handler(message.into())
    }
}
