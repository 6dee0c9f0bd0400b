//! Directives emitted to the transport layer.

use std::fmt;

use libp2p::PeerId;

pub use crate::state::SetId;

/// Opaque token identifying one inbound dial attempt, echoed back in
/// [`Message::Accept`] or [`Message::Reject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IncomingIndex(pub u64);

impl From<u64> for IncomingIndex {
    fn from(index: u64) -> Self {
        Self(index)
    }
}

impl fmt::Display for IncomingIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a connection ended, as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropReason {
    #[default]
    Unknown,
    /// The remote refused the substream; the peer is removed from the set.
    Refused,
}

/// An imperative directive for the transport. The transport executes it and
/// should not reinterpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<Id = PeerId> {
    /// Open an outbound connection to `peer` in `set`.
    Connect { set: SetId, peer: Id },
    /// Close the connection to `peer` in `set`.
    Drop { set: SetId, peer: Id },
    /// Accept the inbound attempt identified by the index.
    Accept(IncomingIndex),
    /// Refuse the inbound attempt identified by the index.
    Reject(IncomingIndex),
}

impl<Id> Message<Id> {
    /// Short name used as a metrics and log label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Drop { .. } => "drop",
            Self::Accept(_) => "accept",
            Self::Reject(_) => "reject",
        }
    }
}
