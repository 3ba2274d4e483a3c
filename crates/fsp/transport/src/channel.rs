use tokio::sync::mpsc;

use crate::error::TransportError;

/// One end of a bidirectional conduit carrying wire strings.
///
/// Messages sent from one end are delivered to the other in send order.
/// There is no ordering guarantee across different channels.
#[derive(Debug)]
pub struct Channel {
    tx: Option<mpsc::Sender<String>>,
    rx: Option<mpsc::Receiver<String>>,
}

impl Channel {
    /// Create a connected pair of channel ends.
    pub fn pair(capacity: usize) -> (Channel, Channel) {
        let (a_tx, a_rx) = mpsc::channel(capacity);
        let (b_tx, b_rx) = mpsc::channel(capacity);
        (
            Channel {
                tx: Some(a_tx),
                rx: Some(b_rx),
            },
            Channel {
                tx: Some(b_tx),
                rx: Some(a_rx),
            },
        )
    }

    /// Send a wire string to the peer.
    ///
    /// Fails with [`TransportError::Closed`] once either end has closed.
    pub async fn send(&self, message: impl Into<String>) -> Result<(), TransportError> {
        match &self.tx {
            Some(tx) => tx
                .send(message.into())
                .await
                .map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    /// Receive the next wire string.
    ///
    /// Returns `None` once the peer has closed and all buffered messages
    /// have been drained, or immediately after a local [`close`](Self::close).
    pub async fn recv(&mut self) -> Option<String> {
        match &mut self.rx {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Whether this end can still send to the peer.
    pub fn is_writable(&self) -> bool {
        matches!(&self.tx, Some(tx) if !tx.is_closed())
    }

    /// Close this end, releasing both directions.
    ///
    /// Safe to call multiple times. Pending unread messages are discarded;
    /// the peer's subsequent sends fail and its `recv` drains then ends.
    pub fn close(&mut self) {
        self.tx.take();
        self.rx.take();
    }
}
