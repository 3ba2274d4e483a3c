use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::channel::Channel;
use crate::error::TransportError;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Name a service endpoint is bound under.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointAddress(String);

impl EndpointAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

/// A client connection handed to a service's accept loop.
pub struct IncomingConnection {
    pub channel: Channel,
    pub caller_id: String,
}

/// In-process broker of named endpoints.
///
/// Cloning is cheap; all clones share the same endpoint table.
#[derive(Clone)]
pub struct TransportHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    capacity: usize,
    endpoints: RwLock<HashMap<EndpointAddress, mpsc::Sender<IncomingConnection>>>,
}

impl TransportHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a hub whose channels buffer up to `capacity` messages per
    /// direction.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                capacity,
                endpoints: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Bind an address and start accepting connections on it.
    ///
    /// Fails with [`TransportError::AddressInUse`] while another listener is
    /// live on the same address. A dropped listener frees its address.
    pub async fn bind(&self, address: &EndpointAddress) -> Result<Listener, TransportError> {
        let mut endpoints = self.inner.endpoints.write().await;
        if let Some(existing) = endpoints.get(address) {
            if !existing.is_closed() {
                return Err(TransportError::AddressInUse {
                    address: address.clone(),
                });
            }
            debug!(%address, "replacing dropped listener");
        }

        let (tx, rx) = mpsc::channel(self.inner.capacity);
        endpoints.insert(address.clone(), tx);
        debug!(%address, "endpoint bound");

        Ok(Listener {
            address: address.clone(),
            incoming: rx,
        })
    }

    /// Release an address so it can be bound again.
    pub async fn unbind(&self, address: &EndpointAddress) {
        if self.inner.endpoints.write().await.remove(address).is_some() {
            debug!(%address, "endpoint unbound");
        }
    }

    /// Establish one logical client connection to a bound endpoint.
    pub async fn connect(
        &self,
        address: &EndpointAddress,
        caller_id: impl Into<String>,
    ) -> Result<Channel, TransportError> {
        let endpoints = self.inner.endpoints.read().await;
        let acceptor = endpoints
            .get(address)
            .ok_or_else(|| TransportError::EndpointNotFound {
                address: address.clone(),
            })?;

        let caller_id = caller_id.into();
        let (client_end, service_end) = Channel::pair(self.inner.capacity);
        acceptor
            .send(IncomingConnection {
                channel: service_end,
                caller_id: caller_id.clone(),
            })
            .await
            .map_err(|_| TransportError::EndpointGone {
                address: address.clone(),
            })?;

        debug!(%address, caller_id, "connection established");
        Ok(client_end)
    }
}

impl Default for TransportHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept side of a bound endpoint.
#[derive(Debug)]
pub struct Listener {
    address: EndpointAddress,
    incoming: mpsc::Receiver<IncomingConnection>,
}

impl Listener {
    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    /// Wait for the next client connection.
    ///
    /// Returns `None` once the endpoint has been unbound. Accepted
    /// connections are independent; nothing a connection does blocks this
    /// accept loop.
    pub async fn accept(&mut self) -> Option<IncomingConnection> {
        self.incoming.recv().await
    }
}
