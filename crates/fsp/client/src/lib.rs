//! Client-side request driver for the Flow Service Protocol.
//!
//! [`initiate`] opens a channel to a service endpoint, sends one request
//! envelope and hands back a [`RequestStream`]: a lazy, finite, cancellable
//! sequence of [`FlowEvent`]s. The sequence carries an optional
//! acknowledgement and intermediate responses, then exactly one terminal
//! (response, error, or a distinct "channel closed unexpectedly" failure).
//!
//! The driver enforces no timeouts; if a service never acknowledges, that
//! policy belongs to the caller, layered on top of the stream.

#![deny(unsafe_code)]

pub mod client;
pub mod driver;
pub mod error;
pub mod stream;

pub use client::FlowClient;
pub use driver::initiate;
pub use error::ClientError;
pub use stream::{FlowEvent, RequestStream};
