//! Peer set errors.

use thiserror::Error;

use crate::state::{Direction, SetId};

#[derive(Debug, Error)]
pub enum PeerSetError {
    #[error("peer set configuration contains no sets")]
    ConfigSetEmpty,
    #[error("set {set} out of range, {num_sets} sets configured")]
    SetOutOfRange { set: SetId, num_sets: usize },
    #[error("peer {peer} does not exist")]
    PeerDoesNotExist { peer: String },
    #[error("peer {peer} already disconnected from set {set}")]
    PeerAlreadyDisconnected { peer: String, set: SetId },
    #[error("peer {peer} already connected in set {set}")]
    PeerAlreadyConnected { peer: String, set: SetId },
    #[error("no {direction} slots available in set {set}")]
    SlotsUnavailable { set: SetId, direction: Direction },
    #[error("received disconnect for non-connected peer {peer} in set {set}")]
    DisconnectForNonConnectedPeer { peer: String, set: SetId },
    #[error("peer set service stopped")]
    ServiceStopped,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PeerSetError {
    pub(crate) fn unknown_peer(peer: &impl std::fmt::Debug) -> Self {
        Self::PeerDoesNotExist {
            peer: format!("{peer:?}"),
        }
    }

    /// Slot exhaustion is ordinary control flow for the allocator, not a fault.
    pub fn is_slots_unavailable(&self) -> bool {
        matches!(self, Self::SlotsUnavailable { .. })
    }
}

impl From<toml::de::Error> for PeerSetError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
