//! Cloneable handle for interacting with the peer set service.

use libp2p::PeerId;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, Span};

use crate::config::PeerSetConfig;
use crate::error::PeerSetError;
use crate::message::{DropReason, IncomingIndex, Message};
use crate::reputation::{Reputation, ReputationChange};
use crate::service::{Action, PeerSetService};
use crate::state::SetId;
use crate::traits::NetPeerId;

/// Build the peer set service and spawn it on the current tokio runtime.
///
/// Every record the service emits is attached to `span`. The returned receiver
/// must be drained by a task that does not itself wait on this handle, or a
/// full message queue stalls both sides.
pub fn spawn_peerset<Id: NetPeerId>(
    config: PeerSetConfig<Id>,
    span: Span,
) -> Result<(PeerSetHandle<Id>, mpsc::Receiver<Message<Id>>), PeerSetError> {
    let (service, handle, message_rx) = PeerSetService::new(&config)?;
    tokio::spawn(service.run().instrument(span));
    Ok((handle, message_rx))
}

/// Cloneable handle queueing actions on the peer set service.
///
/// Every method waits while the action queue is full and fails with
/// [`PeerSetError::ServiceStopped`] once the service is gone.
#[derive(Debug)]
pub struct PeerSetHandle<Id = PeerId> {
    action_tx: mpsc::Sender<Action<Id>>,
}

impl<Id> Clone for PeerSetHandle<Id> {
    fn clone(&self) -> Self {
        Self {
            action_tx: self.action_tx.clone(),
        }
    }
}

impl<Id: NetPeerId> PeerSetHandle<Id> {
    /// Create a new handle from an action sender.
    pub fn new(action_tx: mpsc::Sender<Action<Id>>) -> Self {
        Self { action_tx }
    }

    async fn send(&self, action: Action<Id>) -> Result<(), PeerSetError> {
        self.action_tx
            .send(action)
            .await
            .map_err(|_| PeerSetError::ServiceStopped)
    }

    pub fn is_closed(&self) -> bool {
        self.action_tx.is_closed()
    }

    /// Keep a connection to `peer` in `set`, outside of the slot limits.
    pub async fn add_reserved_peer(&self, set: SetId, peer: Id) -> Result<(), PeerSetError> {
        self.send(Action::AddReservedPeer { set, peer }).await
    }

    pub async fn remove_reserved_peer(&self, set: SetId, peer: Id) -> Result<(), PeerSetError> {
        self.send(Action::RemoveReservedPeer { set, peer }).await
    }

    /// Replace the reserved peers of `set`.
    pub async fn set_reserved_peers(
        &self,
        set: SetId,
        peers: impl IntoIterator<Item = Id>,
    ) -> Result<(), PeerSetError> {
        self.send(Action::SetReservedPeers {
            set,
            peers: peers.into_iter().collect(),
        })
        .await
    }

    pub async fn set_reserved_only(
        &self,
        set: SetId,
        reserved_only: bool,
    ) -> Result<(), PeerSetError> {
        self.send(Action::SetReservedOnly { set, reserved_only })
            .await
    }

    pub async fn report_peer(&self, peer: Id, change: ReputationChange) -> Result<(), PeerSetError> {
        self.send(Action::ReportPeer { peer, change }).await
    }

    /// Make `peer` a connection candidate in `set`.
    pub async fn add_to_peer_set(&self, set: SetId, peer: Id) -> Result<(), PeerSetError> {
        self.send(Action::AddToPeerSet { set, peer }).await
    }

    pub async fn remove_from_peer_set(&self, set: SetId, peer: Id) -> Result<(), PeerSetError> {
        self.send(Action::RemoveFromPeerSet { set, peer }).await
    }

    /// Report an inbound dial attempt. The answer arrives on the message
    /// receiver as `Accept(index)` or `Reject(index)`.
    pub async fn incoming(
        &self,
        set: SetId,
        peer: Id,
        index: IncomingIndex,
    ) -> Result<(), PeerSetError> {
        self.send(Action::Incoming { set, peer, index }).await
    }

    /// Report a connection closed by the transport or refused by the remote.
    pub async fn dropped(&self, set: SetId, peer: Id, reason: DropReason) -> Result<(), PeerSetError> {
        self.send(Action::Dropped { set, peer, reason }).await
    }

    /// Ask for a connection to be closed. A `Drop` follows on the message receiver.
    pub async fn disconnect_peer(&self, set: SetId, peer: Id) -> Result<(), PeerSetError> {
        self.send(Action::DisconnectPeer { set, peer }).await
    }

    /// Connected peers of `set`, best first, as of this request's turn in the queue.
    pub async fn sorted_peers(&self, set: SetId) -> Result<Vec<Id>, PeerSetError> {
        let (tx, rx) = oneshot::channel();
        self.send(Action::SortedPeers {
            set,
            response_tx: tx,
        })
        .await?;

        rx.await.map_err(|_| PeerSetError::ServiceStopped)?
    }

    pub async fn reputation(&self, peer: Id) -> Result<Reputation, PeerSetError> {
        let (tx, rx) = oneshot::channel();
        self.send(Action::GetReputation {
            peer,
            response_tx: tx,
        })
        .await?;

        rx.await.map_err(|_| PeerSetError::ServiceStopped)?
    }
}
