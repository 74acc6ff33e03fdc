//! Raymond's algorithm over a fixed pool of tokens.
//!
//! Every node tracks where it believes each token is in a [`TokenDatabase`].
//! A token is bound to the group of the request it was granted for and only
//! serves that group until its holder leaves the section, so up to `tokens`
//! nodes may be inside at once.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

use super::token_db::{TokenDatabase, TokenEntry};
use crate::config::NodeConfig;
use crate::message::decode_or_drop;
use crate::outbox::Outbox;
use crate::signal::EntrySignal;
use crate::{Algorithm, GroupId, Message, MessageKind, NodeId, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueuedRequest {
    requester: NodeId,
    group: GroupId,
}

#[derive(Debug)]
struct KEntryState {
    tokens: TokenDatabase,
    queue: Vec<QueuedRequest>,
    using: bool,
}

/// Raymond node holding any number of the system's k tokens.
pub struct RaymondKEntryNode<T: Transport> {
    id: NodeId,
    outbox: Outbox<T>,
    state: Mutex<KEntryState>,
    signal: EntrySignal,
}

impl<T: Transport> RaymondKEntryNode<T> {
    /// All `config.tokens` tokens start out free at `config.holder`.
    pub fn new(config: NodeConfig<T::Addr>, transport: Arc<T>) -> Self {
        Self {
            id: config.id,
            outbox: Outbox::new(config.neighbours, transport),
            state: Mutex::new(KEntryState {
                tokens: TokenDatabase::new(config.holder, config.tokens),
                queue: Vec::new(),
                using: false,
            }),
            signal: EntrySignal::new(),
        }
    }

    /// Copy of the local token view.
    pub async fn tokens(&self) -> TokenDatabase {
        self.state.lock().await.tokens.clone()
    }

    /// Queued `(requester, group)` pairs, front first.
    pub async fn pending_requests(&self) -> Vec<(NodeId, GroupId)> {
        self.state
            .lock()
            .await
            .queue
            .iter()
            .map(|r| (r.requester, r.group.clone()))
            .collect()
    }

    /// Grants what can be granted, then asks for a token on behalf of the front
    /// request if no local token can serve it.
    async fn assign_privilege(&self, state: &mut KEntryState, filter: Option<&GroupId>) {
        self.grant_spare_tokens(state, filter).await;

        let Some(front) = state.queue.first() else {
            return;
        };
        if !state.tokens.has_spare(self.id, &front.group) {
            let group = front.group.clone();
            self.make_request(state, &group).await;
        }
    }

    /// Grants spare tokens to queued requests, oldest first, for as long as
    /// one can be granted. With a `filter` only requests for that group are
    /// considered.
    async fn grant_spare_tokens(&self, state: &mut KEntryState, filter: Option<&GroupId>) {
        let me = self.id;
        loop {
            let Some(at) = state.queue.iter().position(|r| {
                filter.is_none_or(|g| *g == r.group) && state.tokens.has_spare(me, &r.group)
            }) else {
                return;
            };
            let request = state.queue.remove(at);
            let Some(mut token) = state.tokens.take_spare(me, &request.group) else {
                return;
            };
            let bound = request.group.bound().cloned();

            if request.requester == me {
                token.group = bound;
                token.in_use = true;
                state.tokens.insert(token);
                state.using = true;
                debug!(group = %request.group, "token taken for local use");
                self.signal.notify();
                continue;
            }

            let privilege = Message::privilege(me, request.group.clone());
            match self.outbox.send(request.requester, privilege).await {
                Ok(()) => {
                    debug!(to = %request.requester, group = %request.group, "token passed on");
                    state.tokens.insert(TokenEntry {
                        holder: request.requester,
                        group: bound,
                        in_use: false,
                    });
                }
                Err(error) => {
                    error!(to = %request.requester, ?error, "token lost: privilege could not be sent");
                }
            }
        }
    }

    /// Asks some other holder for a token for `group`. A holder that cannot be
    /// reached is dropped from the local view.
    async fn make_request(&self, state: &mut KEntryState, group: &GroupId) {
        if state.tokens.has_token(self.id, group) || state.queue.is_empty() {
            return;
        }
        let Some(holder) = state.tokens.other_holder(self.id) else {
            debug!(%group, "no other token holder known");
            return;
        };

        match self
            .outbox
            .send(holder, Message::token_request(self.id, group.clone()))
            .await
        {
            Ok(()) => debug!(%holder, %group, "token requested"),
            Err(error) => {
                warn!(%holder, ?error, "token holder unreachable, evicting");
                state.tokens.evict(holder);
            }
        }
    }

    #[instrument(skip_all, fields(node = %self.id, from = %msg.sender, kind = %msg.kind, group = %msg.group))]
    async fn handle(&self, msg: Message) {
        let me = self.id;
        let mut state = self.state.lock().await;
        match msg.kind {
            MessageKind::Request => {
                state.queue.push(QueuedRequest {
                    requester: msg.sender,
                    group: msg.group.clone(),
                });
                if state.tokens.has_token(me, &msg.group) {
                    self.assign_privilege(&mut state, msg.group.bound()).await;
                } else {
                    match state.tokens.other_holder(me) {
                        Some(holder) if holder != msg.sender => {
                            self.make_request(&mut state, &msg.group).await;
                        }
                        _ => warn!("no eligible token holder, request left queued"),
                    }
                }
            }
            MessageKind::Privilege => {
                state
                    .tokens
                    .transfer_from(msg.sender, me, msg.group.bound().cloned());
                self.grant_spare_tokens(&mut state, msg.group.bound()).await;
                state.tokens.release_idle(me);
                self.assign_privilege(&mut state, None).await;
            }
            MessageKind::Reply | MessageKind::Release => debug!("ignoring message"),
        }
    }
}

impl<T: Transport> Algorithm for RaymondKEntryNode<T> {
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
        state.queue.push(QueuedRequest {
            requester: self.id,
            group: group.clone(),
        });
        if state.tokens.has_token(self.id, &group) {
            self.assign_privilege(&mut state, group.bound()).await;
        } else {
            self.make_request(&mut state, &group).await;
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
        state.tokens.release_all(self.id);
        self.assign_privilege(&mut state, None).await;
    }
}
