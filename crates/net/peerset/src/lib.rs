//! Peer-set manager: decides which peers to dial, accept and drop across independent peer sets.
//!
//! A single service task owns all peer state. Callers talk to it through a cloneable
//! [`PeerSetHandle`], and the transport executes the [`Message`]s it emits.

pub mod config;
pub mod error;
pub mod handle;
pub mod message;
pub mod metrics;
pub mod peerset;
pub mod reputation;
pub mod service;
pub mod state;
pub mod traits;

pub use config::{PeerSetConfig, SetConfig};
pub use error::PeerSetError;
pub use handle::{PeerSetHandle, spawn_peerset};
pub use message::{DropReason, IncomingIndex, Message};
pub use crate::metrics::PeerSetMetrics;
pub use peerset::PeerSet;
pub use reputation::{
    BANNED_THRESHOLD, DISCONNECT_REPUTATION_CHANGE, FORGET_AFTER, Reputation, ReputationChange,
    changes,
};
pub use service::{Action, PeerSetService};
pub use state::{Direction, MembershipState, Node, PeerStatus, PeersState, SetId, SetInfo};
pub use traits::NetPeerId;
