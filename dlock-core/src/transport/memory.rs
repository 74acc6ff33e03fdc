//! In-process datagram network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use error_stack::{Report, ResultExt};
use tokio::sync::mpsc;

use crate::error::{PeerContext, TransportError};
use crate::{NodeId, Transport};

/// Shared in-process network. Cloning yields another handle to the same
/// network.
///
/// Each joined node gets an inbox. Datagrams from one sender to one receiver
/// arrive in send order. Sending to a node that never joined, or that has been
/// [disconnected](Self::disconnect), fails with
/// [`TransportError::Unreachable`].
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    inboxes: Mutex<HashMap<NodeId, mpsc::UnboundedSender<Bytes>>>,
    sent: AtomicU64,
}

impl MemoryNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` and returns its transport. Joining again replaces the
    /// previous inbox.
    #[must_use]
    pub fn join(&self, id: NodeId) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .inboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        MemoryTransport {
            id,
            network: self.clone(),
            inbox: tokio::sync::Mutex::new(rx),
        }
    }

    /// Removes `id` from the network. Later sends to it fail; its receive loop
    /// drains what was already delivered and then sees
    /// [`TransportError::Closed`].
    pub fn disconnect(&self, id: NodeId) {
        self.inner
            .inboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Number of datagrams successfully handed to an inbox.
    #[must_use]
    pub fn messages_sent(&self) -> u64 {
        self.inner.sent.load(Ordering::Relaxed)
    }

    fn deliver(&self, to: NodeId, payload: Bytes) -> Result<(), Report<TransportError>> {
        let inboxes = self
            .inner
            .inboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let inbox = inboxes
            .get(&to)
            .ok_or_else(|| Report::new(TransportError::Unreachable).attach(PeerContext::new(to)))?;
        inbox
            .send(payload)
            .change_context(TransportError::Unreachable)
            .attach(PeerContext::new(to))?;
        self.inner.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    id: NodeId,
    network: MemoryNetwork,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl MemoryTransport {
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    /// Takes the next delivered datagram without waiting. Returns `None` when
    /// the inbox is empty or a receive loop currently owns it.
    #[must_use]
    pub fn try_recv(&self) -> Option<Bytes> {
        self.inbox.try_lock().ok()?.try_recv().ok()
    }
}

impl Transport for MemoryTransport {
    type Addr = NodeId;

    async fn send(&self, to: &NodeId, payload: Bytes) -> Result<(), Report<TransportError>> {
        self.network.deliver(*to, payload)
    }

    async fn recv(&self) -> Result<Bytes, Report<TransportError>> {
        self.inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| Report::new(TransportError::Closed))
    }
}
