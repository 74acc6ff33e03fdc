//! Lamport's timestamp-ordered mutual exclusion.
//!
//! A node broadcasts a timestamped REQUEST and enters once every neighbour has
//! replied and its own request is at the front of its local queue. Requests
//! that arrive while the node is in its section are answered on exit.

mod k_entry;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::clock::LogicalClock;
use crate::config::NodeConfig;
use crate::message::decode_or_drop;
use crate::outbox::Outbox;
use crate::signal::EntrySignal;
use crate::{Algorithm, GroupId, Message, MessageKind, NodeId, Transport};

pub use k_entry::LamportKEntryNode;

/// One outstanding claim on the critical section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingRequest {
    pub(crate) requester: NodeId,
    pub(crate) group: GroupId,
    pub(crate) time: u64,
}

/// Requests ordered by `(time, requester)`. Equal keys stay in arrival order
/// and duplicates are kept.
#[derive(Debug, Default)]
pub(crate) struct RequestQueue {
    entries: Vec<PendingRequest>,
}

impl RequestQueue {
    pub(crate) fn insert(&mut self, request: PendingRequest) {
        let key = (request.time, request.requester);
        let at = self
            .entries
            .partition_point(|e| (e.time, e.requester) <= key);
        self.entries.insert(at, request);
    }

    /// Removes the first request issued by `requester`, if any.
    pub(crate) fn remove_first(&mut self, requester: NodeId) -> Option<PendingRequest> {
        let at = self.entries.iter().position(|e| e.requester == requester)?;
        Some(self.entries.remove(at))
    }

    pub(crate) fn front(&self) -> Option<&PendingRequest> {
        self.entries.first()
    }

    pub(crate) fn requesters(&self) -> Vec<NodeId> {
        self.entries.iter().map(|e| e.requester).collect()
    }
}

/// A REPLY held back until the local node leaves its section.
#[derive(Debug, Clone)]
pub(crate) struct DeferredReply {
    pub(crate) to: NodeId,
    pub(crate) reply: Message,
}

#[derive(Debug)]
struct LamportState {
    clock: LogicalClock,
    queue: RequestQueue,
    deferred: Vec<DeferredReply>,
    in_section: bool,
    replies: usize,
}

/// Single critical section over a fully connected set of neighbours.
pub struct LamportNode<T: Transport> {
    id: NodeId,
    outbox: Outbox<T>,
    state: Mutex<LamportState>,
    signal: EntrySignal,
}

impl<T: Transport> LamportNode<T> {
    pub fn new(config: NodeConfig<T::Addr>, transport: Arc<T>) -> Self {
        Self {
            id: config.id,
            outbox: Outbox::new(config.neighbours, transport),
            state: Mutex::new(LamportState {
                clock: LogicalClock::new(),
                queue: RequestQueue::default(),
                deferred: Vec::new(),
                in_section: false,
                replies: 0,
            }),
            signal: EntrySignal::new(),
        }
    }

    pub async fn clock(&self) -> u64 {
        self.state.lock().await.clock.time()
    }

    /// Requesters in local queue order.
    pub async fn pending_requests(&self) -> Vec<NodeId> {
        self.state.lock().await.queue.requesters()
    }

    pub async fn deferred_replies(&self) -> usize {
        self.state.lock().await.deferred.len()
    }

    #[instrument(skip_all, fields(node = %self.id, from = %msg.sender, kind = %msg.kind))]
    async fn handle(&self, msg: Message) {
        let mut state = self.state.lock().await;
        state.clock.observe(msg.time);

        match msg.kind {
            MessageKind::Request => {
                state.queue.insert(PendingRequest {
                    requester: msg.sender,
                    group: GroupId::UNTAGGED,
                    time: msg.time,
                });
                let reply = Message::reply(self.id, state.clock.time(), GroupId::UNTAGGED);
                if state.in_section {
                    debug!("deferring reply");
                    state.deferred.push(DeferredReply {
                        to: msg.sender,
                        reply,
                    });
                } else {
                    self.outbox.send_logged(msg.sender, reply).await;
                }
            }
            MessageKind::Reply => {
                state.replies += 1;
                debug!(replies = state.replies, "reply received");
                self.signal.notify();
            }
            MessageKind::Release => {
                if state.queue.remove_first(msg.sender).is_none() {
                    debug!("release without a pending request");
                }
                self.signal.notify();
            }
            MessageKind::Privilege => debug!("ignoring message"),
        }
    }
}

impl<T: Transport> Algorithm for LamportNode<T> {
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
        state.clock.tick();
        let time = state.clock.time();
        state.queue.insert(PendingRequest {
            requester: self.id,
            group: GroupId::UNTAGGED,
            time,
        });
        debug!(time, "requesting entry");
        self.outbox
            .broadcast(&Message::request(self.id, time, GroupId::UNTAGGED))
            .await;
    }

    #[instrument(skip_all, fields(node = %self.id))]
    async fn await_entry(&self) {
        let needed = self.outbox.neighbour_count();
        loop {
            {
                let mut state = self.state.lock().await;
                let at_front = state.queue.front().is_some_and(|r| r.requester == self.id);
                if state.replies == needed && at_front {
                    state.replies = 0;
                    debug!("entry granted");
                    return;
                }
            }
            self.signal.wait().await;
        }
    }

    async fn in_section(&self) -> bool {
        self.state.lock().await.in_section
    }

    async fn enter_section(&self) {
        let mut state = self.state.lock().await;
        state.clock.tick();
        state.in_section = true;
    }

    #[instrument(skip_all, fields(node = %self.id))]
    async fn leave_section(&self) {
        let mut state = self.state.lock().await;
        state.clock.tick();
        state.in_section = false;

        for DeferredReply { to, reply } in std::mem::take(&mut state.deferred) {
            self.outbox.send_logged(to, reply).await;
        }
        self.outbox
            .broadcast(&Message::release(self.id, state.clock.time()))
            .await;
        state.queue.remove_first(self.id);
        debug!("left section");
    }
}
