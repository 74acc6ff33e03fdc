//! Lamport negotiation tagged with a critical-section group.
//!
//! Requests for the group a node is itself after are answered at once, so
//! several nodes of one group may hold the section together. A request for a
//! different group is answered immediately only when the receiver is outside
//! its section and the request is newer than the receiver's clock; otherwise
//! the reply waits for the receiver's exit.
//!
//! The clock is read after the request has been observed, so a node that wants
//! one group holds back every reply to another until it leaves. Two nodes of
//! different groups that request at the same time therefore wait on each other
//! with no way out.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{DeferredReply, PendingRequest, RequestQueue};
use crate::clock::LogicalClock;
use crate::config::NodeConfig;
use crate::message::decode_or_drop;
use crate::outbox::Outbox;
use crate::signal::EntrySignal;
use crate::{Algorithm, GroupId, Message, MessageKind, NodeId, Transport};

#[derive(Debug)]
struct KEntryState {
    clock: LogicalClock,
    queue: RequestQueue,
    deferred: Vec<DeferredReply>,
    in_section: bool,
    active_group: Option<GroupId>,
    replies: BTreeMap<GroupId, usize>,
}

/// How a REQUEST for another node's group is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyDecision {
    Now,
    Defer,
}

impl KEntryState {
    /// Called after the request's timestamp has been observed.
    fn decide(&self, group: &GroupId, request_time: u64) -> ReplyDecision {
        match &self.active_group {
            None => ReplyDecision::Now,
            Some(active) if active == group => ReplyDecision::Now,
            Some(_) if self.in_section => ReplyDecision::Defer,
            Some(_) if self.clock.time() < request_time => ReplyDecision::Now,
            Some(_) => ReplyDecision::Defer,
        }
    }
}

/// Lamport node whose requests carry a [`GroupId`].
pub struct LamportKEntryNode<T: Transport> {
    id: NodeId,
    outbox: Outbox<T>,
    state: Mutex<KEntryState>,
    signal: EntrySignal,
}

impl<T: Transport> LamportKEntryNode<T> {
    pub fn new(config: NodeConfig<T::Addr>, transport: Arc<T>) -> Self {
        Self {
            id: config.id,
            outbox: Outbox::new(config.neighbours, transport),
            state: Mutex::new(KEntryState {
                clock: LogicalClock::new(),
                queue: RequestQueue::default(),
                deferred: Vec::new(),
                in_section: false,
                active_group: None,
                replies: BTreeMap::new(),
            }),
            signal: EntrySignal::new(),
        }
    }

    pub async fn clock(&self) -> u64 {
        self.state.lock().await.clock.time()
    }

    pub async fn active_group(&self) -> Option<GroupId> {
        self.state.lock().await.active_group.clone()
    }

    pub async fn deferred_replies(&self) -> usize {
        self.state.lock().await.deferred.len()
    }

    #[instrument(skip_all, fields(node = %self.id, from = %msg.sender, kind = %msg.kind, group = %msg.group))]
    async fn handle(&self, msg: Message) {
        let mut state = self.state.lock().await;
        state.clock.observe(msg.time);

        match msg.kind {
            MessageKind::Request => {
                state.queue.insert(PendingRequest {
                    requester: msg.sender,
                    group: msg.group.clone(),
                    time: msg.time,
                });
                let decision = state.decide(&msg.group, msg.time);
                let reply = Message::reply(self.id, state.clock.time(), msg.group);
                match decision {
                    ReplyDecision::Now => self.outbox.send_logged(msg.sender, reply).await,
                    ReplyDecision::Defer => {
                        debug!("deferring reply");
                        state.deferred.push(DeferredReply {
                            to: msg.sender,
                            reply,
                        });
                    }
                }
            }
            MessageKind::Reply => {
                let count = state.replies.entry(msg.group).or_default();
                *count += 1;
                debug!(replies = *count, "reply received");
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

impl<T: Transport> Algorithm for LamportKEntryNode<T> {
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

    #[instrument(skip_all, fields(node = %self.id, %group))]
    async fn request_entry(&self, group: GroupId) {
        let mut state = self.state.lock().await;
        state.active_group = Some(group.clone());
        state.clock.tick();
        let time = state.clock.time();
        state.queue.insert(PendingRequest {
            requester: self.id,
            group: group.clone(),
            time,
        });
        debug!(time, "requesting entry");
        self.outbox
            .broadcast(&Message::request(self.id, time, group))
            .await;
    }

    #[instrument(skip_all, fields(node = %self.id))]
    async fn await_entry(&self) {
        let needed = self.outbox.neighbour_count();
        loop {
            {
                let mut state = self.state.lock().await;
                let group = state.active_group.clone().unwrap_or_default();
                let replies = state.replies.get(&group).copied().unwrap_or(0);
                let unblocked = state
                    .deferred
                    .first()
                    .is_none_or(|d| d.reply.sender == self.id);
                if replies == needed && unblocked {
                    state.replies.insert(group, 0);
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
        state.active_group = None;

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
