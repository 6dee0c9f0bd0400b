//! Peer set service actor (runs in its own tokio task).
//!
//! The service is the only owner of the [`PeerSet`]. Actions are applied one at
//! a time in the order they were queued, interleaved with a periodic tick that
//! decays reputations and refills outgoing slots.

use std::time::Duration;

use libp2p::PeerId;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::PeerSetConfig;
use crate::error::PeerSetError;
use crate::handle::PeerSetHandle;
use crate::message::{DropReason, IncomingIndex, Message};
use crate::peerset::PeerSet;
use crate::reputation::{Reputation, ReputationChange};
use crate::state::SetId;
use crate::traits::NetPeerId;

/// Requests from the handles to the service.
#[derive(Debug)]
pub enum Action<Id = PeerId> {
    /// Reserve a peer in a set and dial it if needed.
    AddReservedPeer {
        /// The set to reserve the peer in.
        set: SetId,
        /// The peer to reserve.
        peer: Id,
    },
    /// Give a reserved peer back to the regular slots.
    RemoveReservedPeer {
        /// The set the peer is reserved in.
        set: SetId,
        /// The peer to unreserve.
        peer: Id,
    },
    /// Replace the reserved peers of a set.
    SetReservedPeers {
        /// The set to update.
        set: SetId,
        /// The new reserved peers.
        peers: Vec<Id>,
    },
    /// Toggle reserved-only mode of a set.
    SetReservedOnly {
        /// The set to update.
        set: SetId,
        /// Whether only reserved peers may connect.
        reserved_only: bool,
    },
    /// Adjust the reputation of a peer.
    ReportPeer {
        /// The peer being reported.
        peer: Id,
        /// The reputation delta and its reason.
        change: ReputationChange,
    },
    /// Add a connection candidate to a set.
    AddToPeerSet {
        /// The set to add the peer to.
        set: SetId,
        /// The discovered peer.
        peer: Id,
    },
    /// Disconnect and forget a non-reserved peer.
    RemoveFromPeerSet {
        /// The set to remove the peer from.
        set: SetId,
        /// The peer to remove.
        peer: Id,
    },
    /// An inbound dial attempt awaiting `Accept` or `Reject`.
    Incoming {
        /// The set the remote wants to join.
        set: SetId,
        /// The dialing peer.
        peer: Id,
        /// Echoed back in the answer.
        index: IncomingIndex,
    },
    /// The transport closed a connection.
    Dropped {
        /// The set of the closed connection.
        set: SetId,
        /// The disconnected peer.
        peer: Id,
        /// Why the connection went away.
        reason: DropReason,
    },
    /// We want the connection closed.
    DisconnectPeer {
        /// The set of the connection.
        set: SetId,
        /// The peer to disconnect.
        peer: Id,
    },
    /// Query the connected peers of a set, best first.
    SortedPeers {
        /// The set to list.
        set: SetId,
        /// Channel to send the result.
        response_tx: oneshot::Sender<Result<Vec<Id>, PeerSetError>>,
    },
    /// Query the current reputation of a peer.
    GetReputation {
        /// The peer to look up.
        peer: Id,
        /// Channel to send the result.
        response_tx: oneshot::Sender<Result<Reputation, PeerSetError>>,
    },
}

impl<Id> Action<Id> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddReservedPeer { .. } => "add_reserved_peer",
            Self::RemoveReservedPeer { .. } => "remove_reserved_peer",
            Self::SetReservedPeers { .. } => "set_reserved_peers",
            Self::SetReservedOnly { .. } => "set_reserved_only",
            Self::ReportPeer { .. } => "report_peer",
            Self::AddToPeerSet { .. } => "add_to_peer_set",
            Self::RemoveFromPeerSet { .. } => "remove_from_peer_set",
            Self::Incoming { .. } => "incoming",
            Self::Dropped { .. } => "dropped",
            Self::DisconnectPeer { .. } => "disconnect_peer",
            Self::SortedPeers { .. } => "sorted_peers",
            Self::GetReputation { .. } => "reputation",
        }
    }
}

/// Consumes actions from the handles and forwards the resulting messages to the transport.
pub struct PeerSetService<Id: NetPeerId = PeerId> {
    peerset: PeerSet<Id>,
    /// Receive actions from handles.
    action_rx: mpsc::Receiver<Action<Id>>,
    /// Send directives to the transport.
    message_tx: mpsc::Sender<Message<Id>>,
    tick_interval: Duration,
}

impl<Id: NetPeerId> PeerSetService<Id> {
    /// Build the engine and the channels around it.
    ///
    /// Returns the service, a handle feeding it, and the receiver the transport
    /// must drain. Startup `Connect` messages are sent once [`Self::run`] starts.
    pub fn new(
        config: &PeerSetConfig<Id>,
    ) -> Result<(Self, PeerSetHandle<Id>, mpsc::Receiver<Message<Id>>), PeerSetError> {
        config.validate()?;
        let peerset = PeerSet::new(&config.sets)?;

        let (action_tx, action_rx) = mpsc::channel(config.action_queue_capacity);
        let (message_tx, message_rx) = mpsc::channel(config.message_queue_capacity);

        let service = Self {
            peerset,
            action_rx,
            message_tx,
            tick_interval: config.tick_interval(),
        };

        Ok((service, PeerSetHandle::new(action_tx), message_rx))
    }

    /// Run the service event loop.
    ///
    /// This method runs until every handle is dropped or the message receiver
    /// is dropped.
    pub async fn run(mut self) {
        info!(sets = self.peerset.num_sets(), "peer set service started");

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.flush().await.is_err() {
                info!("message receiver dropped, peer set service shutting down");
                break;
            }

            tokio::select! {
                biased;

                _ = self.message_tx.closed() => {
                    info!("message receiver dropped, peer set service shutting down");
                    break;
                }
                action = self.action_rx.recv() => match action {
                    Some(action) => self.handle_action(action),
                    None => {
                        info!("all handles dropped, peer set service shutting down");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    trace!("periodic tick");
                    self.peerset.tick();
                }
            }
        }
    }

    /// Forward buffered messages, waiting while the transport lags behind.
    async fn flush(&mut self) -> Result<(), PeerSetError> {
        while let Some(message) = self.peerset.pop_message() {
            self.message_tx
                .send(message)
                .await
                .map_err(|_| PeerSetError::ServiceStopped)?;
        }
        Ok(())
    }

    fn handle_action(&mut self, action: Action<Id>) {
        let name = action.name();
        trace!(action = name, "processing action");
        self.peerset.metrics().inc_actions();

        let result = match action {
            Action::AddReservedPeer { set, peer } => self.peerset.add_reserved_peer(set, peer),
            Action::RemoveReservedPeer { set, peer } => {
                self.peerset.remove_reserved_peer(set, peer)
            }
            Action::SetReservedPeers { set, peers } => self.peerset.set_reserved_peers(set, peers),
            Action::SetReservedOnly { set, reserved_only } => {
                self.peerset.set_reserved_only(set, reserved_only)
            }
            Action::ReportPeer { peer, change } => self.peerset.report_peer(&peer, change),
            Action::AddToPeerSet { set, peer } => self.peerset.add_to_peer_set(set, peer),
            Action::RemoveFromPeerSet { set, peer } => {
                self.peerset.remove_from_peer_set(set, peer)
            }
            Action::Incoming { set, peer, index } => self.peerset.incoming(set, peer, index),
            Action::Dropped { set, peer, reason } => self.peerset.dropped(set, peer, reason),
            Action::DisconnectPeer { set, peer } => self.peerset.disconnect_peer(set, peer),
            Action::SortedPeers { set, response_tx } => {
                let _ = response_tx.send(self.peerset.sorted_peers(set));
                Ok(())
            }
            Action::GetReputation { peer, response_tx } => {
                let _ = response_tx.send(self.peerset.reputation(&peer));
                Ok(())
            }
        };

        if let Err(err) = result {
            self.peerset.metrics().inc_action_errors();
            match err {
                PeerSetError::PeerDoesNotExist { .. } => {
                    debug!(action = name, %err, "action dropped");
                }
                err => warn!(action = name, %err, "action failed"),
            }
        }
    }
}
