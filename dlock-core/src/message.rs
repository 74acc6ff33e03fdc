//! Protocol identifiers and the datagram wire format.
//!
//! Every message is a flat JSON object. Only the fields relevant to the tag are
//! populated; absent fields decode to their zero value:
//!
//! ```text
//! {"senderId": 3, "receiverAddr": "127.0.0.1:7001", "message": "request", "time": 7, "csId": "east"}
//! ```

use std::fmt;

use bytes::Bytes;
use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CodecError;

/// Stable peer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Critical-section group (CSID).
///
/// The empty group is the untagged section. In token and lock bindings it
/// stands for "unbound".
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub const UNTAGGED: GroupId = GroupId(String::new());

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn is_untagged(&self) -> bool {
        self.0.is_empty()
    }

    /// `None` for the untagged group, which binds nothing.
    #[must_use]
    pub fn bound(&self) -> Option<&GroupId> {
        (!self.is_untagged()).then_some(self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_untagged() {
            f.write_str("<untagged>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for GroupId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Reply,
    Release,
    Privilege,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageKind::Request => "request",
            MessageKind::Reply => "reply",
            MessageKind::Release => "release",
            MessageKind::Privilege => "privilege",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "senderId")]
    pub sender: NodeId,
    #[serde(rename = "receiverAddr", default, skip_serializing_if = "Option::is_none")]
    pub receiver_addr: Option<String>,
    #[serde(rename = "message")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub time: u64,
    #[serde(rename = "csId", default, skip_serializing_if = "GroupId::is_untagged")]
    pub group: GroupId,
}

#[expect(clippy::trivially_copy_pass_by_ref)]
fn is_zero(time: &u64) -> bool {
    *time == 0
}

impl Message {
    fn new(kind: MessageKind, sender: NodeId) -> Self {
        Self {
            sender,
            receiver_addr: None,
            kind,
            time: 0,
            group: GroupId::UNTAGGED,
        }
    }

    #[must_use]
    pub fn request(sender: NodeId, time: u64, group: GroupId) -> Self {
        Self {
            time,
            group,
            ..Self::new(MessageKind::Request, sender)
        }
    }

    #[must_use]
    pub fn reply(sender: NodeId, time: u64, group: GroupId) -> Self {
        Self {
            time,
            group,
            ..Self::new(MessageKind::Reply, sender)
        }
    }

    #[must_use]
    pub fn release(sender: NodeId, time: u64) -> Self {
        Self {
            time,
            ..Self::new(MessageKind::Release, sender)
        }
    }

    #[must_use]
    pub fn privilege(sender: NodeId, group: GroupId) -> Self {
        Self {
            group,
            ..Self::new(MessageKind::Privilege, sender)
        }
    }

    /// Untimed request, as used by the Raymond family.
    #[must_use]
    pub fn token_request(sender: NodeId, group: GroupId) -> Self {
        Self::request(sender, 0, group)
    }

    #[must_use]
    pub fn addressed_to(mut self, addr: impl fmt::Display) -> Self {
        self.receiver_addr = Some(addr.to_string());
        self
    }

    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<Bytes, Report<CodecError>> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .change_context(CodecError::Encode)
    }

    /// Trailing whitespace (the newline some senders append) is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] for anything that is not a well-formed
    /// message object.
    pub fn decode(payload: &[u8]) -> Result<Self, Report<CodecError>> {
        serde_json::from_slice(payload)
            .change_context(CodecError::Decode)
            .attach_with(|| format!("payload of {} bytes", payload.len()))
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "senderId")]
    sender: NodeId,
}

/// Reads only the sender of a payload, ignoring every other field.
pub(crate) fn sender_of(payload: &[u8]) -> Option<NodeId> {
    serde_json::from_slice::<Envelope>(payload)
        .ok()
        .map(|envelope| envelope.sender)
}

/// Decodes an inbound payload, logging and discarding it when malformed.
pub(crate) fn decode_or_drop(node: NodeId, payload: &[u8]) -> Option<Message> {
    match Message::decode(payload) {
        Ok(msg) => Some(msg),
        Err(error) => {
            warn!(%node, ?error, "dropping malformed message");
            None
        }
    }
}
