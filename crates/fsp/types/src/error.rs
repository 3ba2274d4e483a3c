use thiserror::Error;

/// Wire codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The wire string is not a well-formed envelope serialization, or its
    /// message type is not a recognized value.
    #[error("malformed envelope: {detail}")]
    MalformedEnvelope { detail: String },

    /// A flow stage name is not one of the known stages.
    #[error("unknown flow stage '{stage}'")]
    UnknownStage { stage: String },
}
