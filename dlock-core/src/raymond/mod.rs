//! Raymond's tree-based privilege passing.
//!
//! Each node only knows the neighbour in whose direction the privilege lies
//! (`holder`). Requests travel up that path one hop at a time and the
//! privilege travels back down, answering queued requests in FIFO order.

mod k_entry;
mod token_db;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::config::NodeConfig;
use crate::message::decode_or_drop;
use crate::outbox::Outbox;
use crate::queue::SharedQueue;
use crate::signal::EntrySignal;
use crate::{Algorithm, GroupId, Message, MessageKind, NodeId, Transport};

pub use k_entry::RaymondKEntryNode;
pub use token_db::{TokenDatabase, TokenEntry};

#[derive(Debug)]
struct RaymondState {
    holder: NodeId,
    using: bool,
    asked: bool,
}

/// Single privilege over a tree of neighbours.
pub struct RaymondNode<T: Transport> {
    id: NodeId,
    outbox: Outbox<T>,
    state: Mutex<RaymondState>,
    queue: SharedQueue<NodeId>,
    signal: EntrySignal,
}

impl<T: Transport> RaymondNode<T> {
    pub fn new(config: NodeConfig<T::Addr>, transport: Arc<T>) -> Self {
        Self {
            id: config.id,
            outbox: Outbox::new(config.neighbours, transport),
            state: Mutex::new(RaymondState {
                holder: config.holder,
                using: false,
                asked: false,
            }),
            queue: SharedQueue::new(),
            signal: EntrySignal::new(),
        }
    }

    /// Neighbour in whose direction the privilege lies, or this node.
    pub async fn holder(&self) -> NodeId {
        self.state.lock().await.holder
    }

    pub async fn asked(&self) -> bool {
        self.state.lock().await.asked
    }

    /// Queued requesters, front first.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<NodeId> {
        self.queue.snapshot()
    }

    /// Passes the privilege to the front of the queue, which may be this node.
    async fn assign_privilege(&self, state: &mut RaymondState) {
        if state.holder != self.id || state.using || self.queue.is_empty() {
            return;
        }
        let Some(next) = self.queue.dequeue() else {
            return;
        };
        state.asked = false;

        if next == self.id {
            state.using = true;
            debug!("privilege taken for local use");
            self.signal.notify();
            return;
        }

        self.outbox
            .send_logged(next, Message::privilege(self.id, GroupId::UNTAGGED))
            .await;
        state.holder = next;
        debug!(holder = %next, "privilege passed on");
        self.make_request(state).await;
    }

    /// Asks `holder` for the privilege once per outstanding need.
    async fn make_request(&self, state: &mut RaymondState) {
        if state.holder == self.id || state.asked || self.queue.is_empty() {
            return;
        }
        let holder = state.holder;
        match self
            .outbox
            .send(holder, Message::token_request(self.id, GroupId::UNTAGGED))
            .await
        {
            Ok(()) => {
                state.asked = true;
                debug!(%holder, "privilege requested");
            }
            Err(error) => warn!(%holder, ?error, "privilege request failed"),
        }
    }

    #[instrument(skip_all, fields(node = %self.id, from = %msg.sender, kind = %msg.kind))]
    async fn handle(&self, msg: Message) {
        let mut state = self.state.lock().await;
        match msg.kind {
            MessageKind::Request => {
                self.queue.enqueue(msg.sender);
                if state.holder == self.id {
                    self.assign_privilege(&mut state).await;
                } else {
                    self.make_request(&mut state).await;
                }
            }
            MessageKind::Privilege => {
                state.holder = self.id;
                self.assign_privilege(&mut state).await;
            }
            MessageKind::Reply | MessageKind::Release => debug!("ignoring message"),
        }
    }
}

impl<T: Transport> Algorithm for RaymondNode<T> {
    type Transport = T;

    fn id(&self) -> NodeId {
        self.id
    }

    fn transport(&self) -> &Arc<T> {
        self.outbox.transport()
    }

    async fn on_message(&self, payload: &[u8]) {
        if let Some(msg) = decode_or_drop(self.id, payload) {
            self.handle(msg).await;
        }
    }

    #[instrument(skip_all, fields(node = %self.id))]
    async fn request_entry(&self, _group: GroupId) {
        let mut state = self.state.lock().await;
        self.queue.enqueue(self.id);
        if state.holder == self.id {
            self.assign_privilege(&mut state).await;
        } else {
            self.make_request(&mut state).await;
        }
    }

    async fn await_entry(&self) {
        self.signal.wait().await;
    }

    async fn in_section(&self) -> bool {
        self.state.lock().await.using
    }

    async fn enter_section(&self) {
        self.state.lock().await.using = true;
    }

    #[instrument(skip_all, fields(node = %self.id))]
    async fn leave_section(&self) {
        let mut state = self.state.lock().await;
        state.using = false;
        self.assign_privilege(&mut state).await;
    }
}
