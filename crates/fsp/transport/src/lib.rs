//! Channel transport between flow clients and flow services.
//!
//! A [`TransportHub`] brokers named endpoints inside one process: services
//! bind an [`EndpointAddress`] and accept connections, clients connect and
//! get back an independent bidirectional [`Channel`]. Many clients may be
//! connected to the same endpoint at once; each connection is its own
//! channel pair and can be closed independently.
//!
//! Protocol completion is always signaled in-band (an END_STREAM envelope)
//! before a channel is closed, so closing a channel with pending unread
//! messages discards them silently.

#![deny(unsafe_code)]

pub mod channel;
pub mod error;
pub mod hub;

pub use channel::Channel;
pub use error::TransportError;
pub use hub::{EndpointAddress, IncomingConnection, Listener, TransportHub};
