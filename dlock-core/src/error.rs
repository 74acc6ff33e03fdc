//! Error types and structured `error_stack` context types.

use std::fmt;

use crate::NodeId;

/// Datagram transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The destination is unknown or cannot be reached.
    Unreachable,
    /// The transport has been shut down; no more datagrams will arrive.
    Closed,
    /// The underlying socket reported an error.
    Io,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Unreachable => f.write_str("peer unreachable"),
            TransportError::Closed => f.write_str("transport closed"),
            TransportError::Io => f.write_str("datagram I/O failed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Wire codec failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    Encode,
    Decode,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode => f.write_str("failed to encode message"),
            CodecError::Decode => f.write_str("malformed message payload"),
        }
    }
}

impl std::error::Error for CodecError {}

/// A protocol message could not be handed to the transport.
#[derive(Debug)]
pub struct SendError;

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to send message")
    }
}

impl std::error::Error for SendError {}

/// Error context: the peer a message was addressed to.
#[derive(Debug, Clone, Copy)]
pub struct PeerContext {
    pub peer: NodeId,
}

impl PeerContext {
    #[must_use]
    pub fn new(peer: NodeId) -> Self {
        Self { peer }
    }
}

impl fmt::Display for PeerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer: {}", self.peer)
    }
}
