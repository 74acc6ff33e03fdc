//! Addressing and encoding of outbound protocol messages.

use std::sync::Arc;

use error_stack::{Report, ResultExt};
use tracing::{trace, warn};

use crate::config::NeighbourTable;
use crate::error::{PeerContext, SendError, TransportError};
use crate::{Message, NodeId, Transport};

#[derive(Debug)]
pub(crate) struct Outbox<T: Transport> {
    neighbours: NeighbourTable<T::Addr>,
    transport: Arc<T>,
}

impl<T: Transport> Outbox<T> {
    pub(crate) fn new(neighbours: NeighbourTable<T::Addr>, transport: Arc<T>) -> Self {
        Self {
            neighbours,
            transport,
        }
    }

    pub(crate) fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub(crate) fn neighbour_count(&self) -> usize {
        self.neighbours.len()
    }

    /// Sends `msg` to neighbour `to`. An id missing from the neighbour table
    /// fails as [`TransportError::Unreachable`].
    pub(crate) async fn send(&self, to: NodeId, msg: Message) -> Result<(), Report<SendError>> {
        let addr = self
            .neighbours
            .get(to)
            .ok_or_else(|| Report::new(TransportError::Unreachable))
            .change_context(SendError)
            .attach(PeerContext::new(to))?;

        let kind = msg.kind;
        let payload = msg.addressed_to(addr).encode().change_context(SendError)?;
        self.transport
            .send(addr, payload)
            .await
            .change_context(SendError)
            .attach(PeerContext::new(to))?;

        trace!(peer = %to, %kind, "message sent");
        Ok(())
    }

    /// Sends `msg` to every neighbour. Failures are logged and skipped.
    pub(crate) async fn broadcast(&self, msg: &Message) {
        for (peer, _) in self.neighbours.iter() {
            if let Err(error) = self.send(peer, msg.clone()).await {
                warn!(%peer, kind = %msg.kind, ?error, "broadcast send failed");
            }
        }
    }

    /// Sends without propagating failure, for messages the protocol never
    /// retries.
    pub(crate) async fn send_logged(&self, to: NodeId, msg: Message) {
        let kind = msg.kind;
        if let Err(error) = self.send(to, msg).await {
            warn!(peer = %to, %kind, ?error, "send failed");
        }
    }
}
