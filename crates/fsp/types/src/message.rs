use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::metadata::InternalData;

/// Empty-data marker used when a message carries no payload.
pub const EMPTY_DATA: &str = "{}";

/// The semantic role of a message, declared explicitly on every envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Client-initiated request carrying the payload to process.
    Request,
    /// Service acknowledgement, sent before the request handler runs.
    Ack,
    /// Response data from the service; the payload may be the empty marker.
    Response,
    /// Failure report carrying an [`ErrorPayload`](crate::ErrorPayload).
    Error,
    /// Demand that the service abandon in-flight processing.
    ForceFinish,
    /// Terminal signal closing a connection's logical exchange.
    EndStream,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Request => "REQUEST",
            MessageType::Ack => "ACK",
            MessageType::Response => "RESPONSE",
            MessageType::Error => "ERROR",
            MessageType::ForceFinish => "FORCE_FINISH",
            MessageType::EndStream => "END_STREAM",
        };
        f.write_str(name)
    }
}

/// The unit of wire exchange between a client and a flow service.
///
/// Serialized shape:
///
/// ```json
/// { "messageType": "REQUEST",
///   "messageData": "<opaque string>",
///   "internalData": { "apiVersion": "1.0.0", "senderId": "...", "extensions": {} } }
/// ```
///
/// `messageData` is opaque to the protocol. `internalData` identifies the
/// sender; receivers must tolerate its absence on every message type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "messageType")]
    message_type: MessageType,
    #[serde(rename = "messageData", default = "default_message_data")]
    message_data: String,
    #[serde(rename = "internalData", skip_serializing_if = "Option::is_none")]
    internal_data: Option<InternalData>,
}

fn default_message_data() -> String {
    EMPTY_DATA.to_string()
}

impl Envelope {
    /// Create an envelope with a payload and sender metadata.
    pub fn new(
        message_type: MessageType,
        message_data: impl Into<String>,
        internal_data: Option<InternalData>,
    ) -> Self {
        Self {
            message_type,
            message_data: message_data.into(),
            internal_data,
        }
    }

    /// Create an envelope carrying the empty-data marker.
    pub fn empty(message_type: MessageType, internal_data: Option<InternalData>) -> Self {
        Self::new(message_type, EMPTY_DATA, internal_data)
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn message_data(&self) -> &str {
        &self.message_data
    }

    pub fn internal_data(&self) -> Option<&InternalData> {
        self.internal_data.as_ref()
    }

    /// Whether the payload is the empty-data marker.
    pub fn is_empty_data(&self) -> bool {
        self.message_data == EMPTY_DATA
    }

    /// Serialize to the wire string.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("envelope serialization is infallible")
    }

    /// Deserialize from a wire string.
    ///
    /// Fails with [`CodecError::MalformedEnvelope`] when the input is not a
    /// well-formed serialization or the message type is not recognized.
    /// Callers must treat that as a protocol violation, not a business error.
    pub fn decode(raw: &str) -> Result<Self, CodecError> {
        serde_json::from_str(raw).map_err(|source| CodecError::MalformedEnvelope {
            detail: source.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn round_trip_request() {
        let mut sender = InternalData::new("1.0.0", "com.example.client");
        sender.add_extension("flowStage", "PRE_FLOW");
        let envelope = Envelope::new(MessageType::Request, r#"{"amount":100}"#, Some(sender));

        let decoded = Envelope::decode(&envelope.encode()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn decodes_documented_wire_shape() {
        let raw = r#"{"messageType":"REQUEST","messageData":"{\"amount\":100}","internalData":{"apiVersion":"1.0.0","senderId":"com.example.client"}}"#;
        let envelope = Envelope::decode(raw).unwrap();

        assert_eq!(envelope.message_type(), MessageType::Request);
        assert_eq!(envelope.message_data(), r#"{"amount":100}"#);
        let sender = envelope.internal_data().unwrap();
        assert_eq!(sender.api_version(), "1.0.0");
        assert_eq!(sender.sender_id(), "com.example.client");
    }

    #[test]
    fn missing_message_data_defaults_to_empty_marker() {
        let envelope = Envelope::decode(r#"{"messageType":"END_STREAM"}"#).unwrap();
        assert_eq!(envelope.message_type(), MessageType::EndStream);
        assert!(envelope.is_empty_data());
        assert!(envelope.internal_data().is_none());
    }

    #[test]
    fn rejects_unknown_message_type() {
        let err = Envelope::decode(r#"{"messageType":"PING","messageData":"{}"}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedEnvelope { .. }));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Envelope::decode("not json at all").is_err());
        assert!(Envelope::decode("").is_err());
        assert!(Envelope::decode(r#"{"messageData":"{}"}"#).is_err());
    }

    #[test]
    fn wire_names_are_screaming_snake() {
        let encoded = Envelope::empty(MessageType::ForceFinish, None).encode();
        assert!(encoded.contains(r#""messageType":"FORCE_FINISH""#));
        let encoded = Envelope::empty(MessageType::EndStream, None).encode();
        assert!(encoded.contains(r#""messageType":"END_STREAM""#));
    }

    fn arb_message_type() -> impl Strategy<Value = MessageType> {
        prop_oneof![
            Just(MessageType::Request),
            Just(MessageType::Ack),
            Just(MessageType::Response),
            Just(MessageType::Error),
            Just(MessageType::ForceFinish),
            Just(MessageType::EndStream),
        ]
    }

    fn arb_internal_data() -> impl Strategy<Value = Option<InternalData>> {
        let extensions = proptest::collection::btree_map("[a-zA-Z0-9]{1,12}", ".{0,24}", 0..4);
        proptest::option::of(("[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}", ".{1,32}", extensions).prop_map(
            |(version, sender_id, extensions)| {
                let mut data = InternalData::new(version, sender_id);
                for (key, value) in extensions {
                    data.add_extension(key, value);
                }
                data
            },
        ))
    }

    proptest! {
        #[test]
        fn round_trip_law(
            message_type in arb_message_type(),
            message_data in ".{0,256}",
            internal_data in arb_internal_data(),
        ) {
            let envelope = Envelope::new(message_type, message_data, internal_data);
            let decoded = Envelope::decode(&envelope.encode()).unwrap();
            prop_assert_eq!(decoded, envelope);
        }
    }
}
