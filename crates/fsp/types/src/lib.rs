//! Core wire types for the Flow Service Protocol.
//!
//! A client and a flow service exchange exactly one logical request and a
//! stream of response events. Every exchange is carried by [`Envelope`]
//! values serialized as JSON strings; the payload inside an envelope is an
//! opaque string the protocol never interprets.

#![deny(unsafe_code)]

pub mod codes;
pub mod error;
pub mod message;
pub mod metadata;
pub mod stage;
pub mod version;

pub use codes::ErrorPayload;
pub use error::CodecError;
pub use message::{Envelope, MessageType, EMPTY_DATA};
pub use metadata::{extensions, InternalData};
pub use stage::FlowStage;
pub use version::VersionComparison;

/// Protocol version implemented by this crate family.
///
/// Follows semver rules with major.minor.patch versions.
pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");
