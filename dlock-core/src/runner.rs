//! Node receive loop.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use error_stack::Report;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace, warn};

use crate::error::TransportError;
use crate::message::sender_of;
use crate::{Algorithm, NodeId, Transport};

/// Feeds every inbound datagram to `node`.
///
/// Datagrams are handed to one task per sender, which calls `on_message` for
/// them in arrival order. Tasks of different senders run concurrently and the
/// loop never waits for a handler to finish. Payloads without a readable sender
/// get a task of their own, where `on_message` logs and drops them.
///
/// Returns `Ok(())` once the transport reports [`TransportError::Closed`];
/// other receive errors are logged and the loop carries on. Sender tasks
/// finish their backlog after the loop ends.
///
/// # Errors
///
/// Currently never returns an error; the signature leaves room for transports
/// whose receive failures are fatal.
#[instrument(skip_all, name = "receive_loop", fields(node = %node.id()))]
pub async fn run<A: Algorithm>(node: Arc<A>) -> Result<(), Report<TransportError>> {
    debug!("receive loop started");
    let transport = Arc::clone(node.transport());
    let mut lanes: HashMap<NodeId, mpsc::UnboundedSender<Bytes>> = HashMap::new();

    loop {
        let payload = match transport.recv().await {
            Ok(payload) => payload,
            Err(e) if *e.current_context() == TransportError::Closed => {
                debug!("transport closed");
                return Ok(());
            }
            Err(e) => {
                warn!(error = ?e, "failed to receive datagram");
                continue;
            }
        };
        trace!(len = payload.len(), "datagram received");

        let Some(sender) = sender_of(&payload) else {
            let node = Arc::clone(&node);
            tokio::spawn(async move {
                node.on_message(&payload).await;
            });
            continue;
        };

        let lane = lanes
            .entry(sender)
            .or_insert_with(|| open_lane(Arc::clone(&node), sender));
        if let Err(mpsc::error::SendError(payload)) = lane.send(payload) {
            // the previous task panicked in a handler
            warn!(%sender, "sender task gone, starting a new one");
            let lane = open_lane(Arc::clone(&node), sender);
            if lane.send(payload).is_ok() {
                lanes.insert(sender, lane);
            }
        }
    }
}

fn open_lane<A: Algorithm>(node: Arc<A>, sender: NodeId) -> mpsc::UnboundedSender<Bytes> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    tokio::spawn(async move {
        trace!(%sender, "sender task started");
        while let Some(payload) = rx.recv().await {
            node.on_message(&payload).await;
        }
    });
    tx
}
