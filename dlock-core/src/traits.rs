//! Core traits: the datagram port and the node contract.

use core::fmt;
use core::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use error_stack::Report;

use crate::error::TransportError;
use crate::{GroupId, NodeId};

/// Fire-and-forget datagram port.
///
/// No delivery or ordering guarantee is implied by a successful `send`.
pub trait Transport: Send + Sync + 'static {
    type Addr: Clone + fmt::Debug + fmt::Display + Send + Sync + 'static;

    fn send(
        &self,
        to: &Self::Addr,
        payload: Bytes,
    ) -> impl Future<Output = Result<(), Report<TransportError>>> + Send;

    /// Waits for the next inbound datagram, in arrival order.
    fn recv(&self) -> impl Future<Output = Result<Bytes, Report<TransportError>>> + Send;
}

/// A mutual-exclusion node.
///
/// Implemented by the four protocol variants; callers stay generic over this
/// trait. `on_message` may run concurrently with every other method.
pub trait Algorithm: Send + Sync + 'static {
    type Transport: Transport;

    fn id(&self) -> NodeId;

    fn transport(&self) -> &Arc<Self::Transport>;

    /// Feed one inbound payload. Malformed payloads are logged and dropped.
    fn on_message(&self, payload: &[u8]) -> impl Future<Output = ()> + Send;

    /// Start acquiring the critical section for `group`. Single-section
    /// variants ignore the group.
    fn request_entry(&self, group: GroupId) -> impl Future<Output = ()> + Send;

    /// Suspends until entry has been granted. There is no timeout.
    fn await_entry(&self) -> impl Future<Output = ()> + Send;

    fn in_section(&self) -> impl Future<Output = bool> + Send;

    fn enter_section(&self) -> impl Future<Output = ()> + Send;

    fn leave_section(&self) -> impl Future<Output = ()> + Send;

    /// Receive loop; see [`crate::run`].
    fn run(self: Arc<Self>) -> impl Future<Output = Result<(), Report<TransportError>>> + Send
    where
        Self: Sized,
    {
        crate::runner::run(self)
    }
}
