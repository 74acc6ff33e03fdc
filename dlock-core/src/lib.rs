//! Distributed mutual exclusion over unreliable datagrams.
//!
//! Four coordination protocols share one node contract, [`Algorithm`]:
//!
//! - [`LamportNode`]: timestamp-ordered request queue with deferred replies.
//! - [`LamportKEntryNode`]: the same negotiation tagged with a critical-section
//!   group, so requests for one group do not wait on each other.
//! - [`RaymondNode`]: a single privilege passed along a tree of neighbours.
//! - [`RaymondKEntryNode`]: a fixed pool of tokens, each bound to a group while
//!   it is used.
//!
//! Nodes talk only through a [`Transport`]. [`UdpTransport`] is the real one;
//! [`MemoryNetwork`] connects nodes inside one process.

#![warn(clippy::pedantic)]

mod clock;
mod config;
pub mod error;
mod lamport;
mod message;
mod outbox;
mod queue;
mod raymond;
mod runner;
mod signal;
mod traits;
pub mod transport;

pub use clock::LogicalClock;
pub use config::{NeighbourTable, NodeConfig, TreePosition, binary_tree, full_mesh};
pub use lamport::{LamportKEntryNode, LamportNode};
pub use message::{GroupId, Message, MessageKind, NodeId};
pub use queue::SharedQueue;
pub use raymond::{RaymondKEntryNode, RaymondNode, TokenDatabase, TokenEntry};
pub use runner::run;
pub use traits::{Algorithm, Transport};
pub use transport::{MemoryNetwork, MemoryTransport, UdpTransport};
