//! Error codes carried in ERROR envelopes.
//!
//! The set is not exhaustive; receivers must treat unrecognized codes as
//! generic failures.

use serde::{Deserialize, Serialize};

/// The received message type is not valid for this endpoint.
pub const INVALID_MESSAGE_TYPE: &str = "INVALID_MESSAGE_TYPE";

/// The service request handler failed with an uncaught error.
pub const SERVICE_EXCEPTION: &str = "SERVICE_EXCEPTION";

/// Generic flow service failure for codes with no more specific meaning.
pub const FLOW_SERVICE_ERROR: &str = "FLOW_SERVICE_ERROR";

/// Structured payload of an ERROR envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("error payload serialization is infallible")
    }

    /// Parse an ERROR envelope payload. Payloads that do not match the
    /// structured shape are folded into [`FLOW_SERVICE_ERROR`] with the raw
    /// text as the message, so callers always get a code to act on.
    pub fn decode_lossy(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|_| Self::new(FLOW_SERVICE_ERROR, raw))
    }
}
