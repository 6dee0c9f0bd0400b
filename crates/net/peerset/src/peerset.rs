//! Slot allocation and reputation policy on top of [`PeersState`].
//!
//! [`PeerSet`] is synchronous. Every operation mutates the store in place and
//! buffers the resulting [`Message`]s, which the owner drains with
//! [`PeerSet::pop_message`].

use std::collections::{BTreeSet, VecDeque};

use libp2p::PeerId;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::SetConfig;
use crate::error::PeerSetError;
use crate::message::{DropReason, IncomingIndex, Message};
use crate::metrics::PeerSetMetrics;
use crate::reputation::{
    DISCONNECT_REPUTATION_CHANGE, FORGET_AFTER, Reputation, ReputationChange,
};
use crate::state::{MembershipState, PeerStatus, PeersState, SetId};
use crate::traits::NetPeerId;

/// Reservation policy of one set.
#[derive(Debug)]
struct SetPolicy<Id> {
    /// Iterated in id order during allocation.
    reserved: BTreeSet<Id>,
    reserved_only: bool,
}

/// Decision engine for every configured set.
#[derive(Debug)]
pub struct PeerSet<Id: NetPeerId = PeerId> {
    state: PeersState<Id>,
    sets: Vec<SetPolicy<Id>>,
    /// Reference point for counting whole elapsed seconds.
    created: Instant,
    latest_time_update: Instant,
    pending: VecDeque<Message<Id>>,
    metrics: PeerSetMetrics,
}

impl<Id: NetPeerId> PeerSet<Id> {
    /// Build the engine, discover boot nodes, register reserved nodes and run a
    /// first allocation pass for every set.
    pub fn new(configs: &[SetConfig<Id>]) -> Result<Self, PeerSetError> {
        let state = PeersState::new(configs)?;
        let now = Instant::now();

        let mut peerset = Self {
            metrics: PeerSetMetrics::new(state.num_sets()),
            state,
            sets: configs
                .iter()
                .map(|cfg| SetPolicy {
                    reserved: BTreeSet::new(),
                    reserved_only: cfg.reserved_only,
                })
                .collect(),
            created: now,
            latest_time_update: now,
            pending: VecDeque::new(),
        };

        for (set, cfg) in configs.iter().enumerate() {
            for peer in &cfg.boot_nodes {
                peerset.state.discover(set, peer)?;
            }
            for peer in &cfg.reserved_nodes {
                peerset.reserve(set, peer)?;
            }
        }

        for set in 0..peerset.num_sets() {
            peerset.alloc_slots(set)?;
        }

        Ok(peerset)
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    pub fn state(&self) -> &PeersState<Id> {
        &self.state
    }

    pub fn metrics(&self) -> &PeerSetMetrics {
        &self.metrics
    }

    pub fn is_reserved(&self, set: SetId, peer: &Id) -> bool {
        self.sets
            .get(set)
            .is_some_and(|policy| policy.reserved.contains(peer))
    }

    pub fn is_reserved_only(&self, set: SetId) -> bool {
        self.sets.get(set).is_some_and(|policy| policy.reserved_only)
    }

    /// Next buffered directive for the transport.
    pub fn pop_message(&mut self) -> Option<Message<Id>> {
        self.pending.pop_front()
    }

    fn push(&mut self, message: Message<Id>) {
        trace!(kind = message.kind(), ?message, "emitting message");
        self.metrics.record_message(&message);
        self.pending.push_back(message);
    }

    fn policy_mut(&mut self, set: SetId) -> Result<&mut SetPolicy<Id>, PeerSetError> {
        let num_sets = self.sets.len();
        self.sets
            .get_mut(set)
            .ok_or(PeerSetError::SetOutOfRange { set, num_sets })
    }

    fn check_set(&self, set: SetId) -> Result<(), PeerSetError> {
        if set < self.sets.len() {
            Ok(())
        } else {
            Err(PeerSetError::SetOutOfRange {
                set,
                num_sets: self.sets.len(),
            })
        }
    }

    /// Apply one step of decay per whole second elapsed since the last update,
    /// then forget zero-reputation peers that stayed disconnected for longer
    /// than [`FORGET_AFTER`] or that belong to no set at all.
    pub fn update_time(&mut self) {
        let now = Instant::now();
        let elapsed_latest = self.latest_time_update.duration_since(self.created).as_secs();
        let elapsed_now = now.duration_since(self.created).as_secs();
        self.latest_time_update = now;

        let secs = elapsed_now.saturating_sub(elapsed_latest);
        if secs == 0 {
            return;
        }

        for _ in 0..secs {
            if !self.state.decay_reputations() {
                break;
            }
        }

        self.forget_expired(now);
    }

    fn forget_expired(&mut self, now: Instant) {
        let expired: Vec<(SetId, Id)> = self
            .state
            .nodes()
            .filter(|(_, node)| node.reputation().is_neutral())
            .flat_map(|(id, node)| {
                node.memberships()
                    .filter(move |(_, membership, last)| {
                        *membership == MembershipState::NotConnected
                            && now.saturating_duration_since(*last) > FORGET_AFTER
                    })
                    .map(move |(set, _, _)| (set, id.clone()))
            })
            .collect();

        for (set, peer) in expired {
            match self.state.forget_peer(set, &peer) {
                Ok(removed) => {
                    debug!(?peer, set, removed, "forgot inactive peer");
                    if removed {
                        self.metrics.inc_forgotten();
                    }
                }
                Err(err) => warn!(?peer, set, %err, "cannot forget peer"),
            }
        }

        for _ in 0..self.state.remove_neutral_non_members() {
            self.metrics.inc_forgotten();
        }
    }

    /// Fill the free outgoing slots of `set`: reserved peers first, then the
    /// best not-connected peers.
    pub fn alloc_slots(&mut self, set: SetId) -> Result<(), PeerSetError> {
        self.check_set(set)?;
        self.update_time();

        let reserved: Vec<Id> = self
            .sets
            .get(set)
            .map(|policy| policy.reserved.iter().cloned().collect())
            .unwrap_or_default();

        for peer in reserved {
            match self.state.peer(set, &peer) {
                PeerStatus::Connected => continue,
                PeerStatus::Unknown => self.state.discover(set, &peer)?,
                PeerStatus::NotConnected => {}
            }

            let reputation = self.state.reputation(&peer)?;
            if reputation.is_banned() {
                debug!(?peer, set, %reputation, "reserved peer is banned");
                break;
            }

            self.state.try_outgoing(set, &peer)?;
            self.push(Message::Connect { set, peer });
        }

        if self.is_reserved_only(set) {
            self.metrics.update_set(&self.state, set);
            return Ok(());
        }

        while self.state.has_free_outgoing_slot(set) {
            let Some(peer) = self.state.highest_not_connected_peer(set) else {
                break;
            };

            let reputation = self.state.reputation(&peer)?;
            if reputation.is_banned() {
                debug!(?peer, set, %reputation, "highest rated peer is banned");
                break;
            }

            if let Err(err) = self.state.try_outgoing(set, &peer) {
                warn!(?peer, set, %err, "cannot connect to peer");
                break;
            }

            debug!(?peer, set, "allocated outgoing slot");
            self.push(Message::Connect { set, peer });
        }

        self.metrics.update_set(&self.state, set);
        Ok(())
    }

    /// Decay, then allocate slots in every set.
    pub fn tick(&mut self) {
        self.update_time();
        for set in 0..self.num_sets() {
            if let Err(err) = self.alloc_slots(set) {
                warn!(set, %err, "failed to allocate slots");
            }
        }
    }

    /// Adjust the peer's reputation. A peer falling below the ban threshold is
    /// dropped from every set it is connected in.
    pub fn report_peer(&mut self, peer: &Id, change: ReputationChange) -> Result<(), PeerSetError> {
        self.update_time();

        let reputation = self.state.add_reputation(peer, change.value)?;
        trace!(?peer, %change, %reputation, "reputation changed");
        if !reputation.is_banned() {
            return Ok(());
        }

        debug!(?peer, %reputation, reason = change.reason, "peer banned");
        for set in 0..self.num_sets() {
            if self.state.peer(set, peer) != PeerStatus::Connected {
                continue;
            }

            self.state.disconnect(set, peer)?;
            self.push(Message::Drop {
                set,
                peer: peer.clone(),
            });
            self.alloc_slots(set)?;
        }
        Ok(())
    }

    fn reserve(&mut self, set: SetId, peer: &Id) -> Result<bool, PeerSetError> {
        if !self.policy_mut(set)?.reserved.insert(peer.clone()) {
            return Ok(false);
        }
        self.state.discover(set, peer)?;
        self.state.add_no_slot_node(set, peer)?;
        Ok(true)
    }

    pub fn add_reserved_peer(&mut self, set: SetId, peer: Id) -> Result<(), PeerSetError> {
        if !self.reserve(set, &peer)? {
            debug!(?peer, set, "peer already reserved");
            return Ok(());
        }
        self.alloc_slots(set)
    }

    /// The peer occupies a slot again. It is dropped if the set is reserved-only
    /// or if it no longer fits in the slots.
    pub fn remove_reserved_peer(&mut self, set: SetId, peer: Id) -> Result<(), PeerSetError> {
        self.update_time();

        let policy = self.policy_mut(set)?;
        if !policy.reserved.remove(&peer) {
            debug!(?peer, set, "peer is not reserved");
            return Ok(());
        }
        let reserved_only = policy.reserved_only;

        self.state.remove_no_slot_node(set, &peer)?;
        if self.state.peer(set, &peer) != PeerStatus::Connected {
            return Ok(());
        }

        let over_capacity = self
            .state
            .set_info(set)
            .is_some_and(|info| info.is_over_capacity());
        if reserved_only || over_capacity {
            self.state.disconnect(set, &peer)?;
            self.push(Message::Drop { set, peer });
        }
        Ok(())
    }

    /// Replace the reserved peers of `set` with `peers`.
    pub fn set_reserved_peers(
        &mut self,
        set: SetId,
        peers: impl IntoIterator<Item = Id>,
    ) -> Result<(), PeerSetError> {
        let wanted: BTreeSet<Id> = peers.into_iter().collect();
        let policy = self.policy_mut(set)?;

        let to_remove: Vec<Id> = policy.reserved.difference(&wanted).cloned().collect();
        let to_insert: Vec<Id> = wanted.difference(&policy.reserved).cloned().collect();

        for peer in to_remove {
            self.remove_reserved_peer(set, peer)?;
        }
        for peer in to_insert {
            self.add_reserved_peer(set, peer)?;
        }
        Ok(())
    }

    /// Enabling drops every connected non-reserved peer; disabling refills the slots.
    pub fn set_reserved_only(&mut self, set: SetId, reserved_only: bool) -> Result<(), PeerSetError> {
        self.update_time();
        self.policy_mut(set)?.reserved_only = reserved_only;
        debug!(set, reserved_only, "reserved-only mode changed");

        if !reserved_only {
            return self.alloc_slots(set);
        }

        for peer in self.state.sorted_peers(set) {
            if self.is_reserved(set, &peer) {
                continue;
            }
            self.state.disconnect(set, &peer)?;
            self.push(Message::Drop { set, peer });
        }
        self.metrics.update_set(&self.state, set);
        Ok(())
    }

    pub fn add_to_peer_set(&mut self, set: SetId, peer: Id) -> Result<(), PeerSetError> {
        if self.state.peer(set, &peer) == PeerStatus::Unknown {
            self.state.discover(set, &peer)?;
        }
        self.alloc_slots(set)
    }

    /// Disconnect and forget a non-reserved peer.
    pub fn remove_from_peer_set(&mut self, set: SetId, peer: Id) -> Result<(), PeerSetError> {
        self.check_set(set)?;
        self.update_time();
        if self.is_reserved(set, &peer) {
            debug!(?peer, set, "peer is reserved and cannot be removed");
            return Ok(());
        }

        let was_connected = match self.state.peer(set, &peer) {
            PeerStatus::Connected => {
                self.push(Message::Drop {
                    set,
                    peer: peer.clone(),
                });
                self.state.disconnect(set, &peer)?;
                true
            }
            PeerStatus::NotConnected => false,
            PeerStatus::Unknown => return Ok(()),
        };

        if self.state.forget_peer(set, &peer)? {
            self.metrics.inc_forgotten();
        }

        if was_connected {
            self.alloc_slots(set)?;
        }
        self.metrics.update_set(&self.state, set);
        Ok(())
    }

    /// Answer an inbound dial attempt with [`Message::Accept`] or
    /// [`Message::Reject`]. A peer we are already connected to gets no answer.
    pub fn incoming(
        &mut self,
        set: SetId,
        peer: Id,
        index: IncomingIndex,
    ) -> Result<(), PeerSetError> {
        self.update_time();

        if let Err(err) = self.check_set(set) {
            self.push(Message::Reject(index));
            return Err(err);
        }

        if self.is_reserved_only(set) && !self.is_reserved(set, &peer) {
            debug!(?peer, set, %index, "rejecting non-reserved peer in reserved-only set");
            self.push(Message::Reject(index));
            return Ok(());
        }

        match self.state.peer(set, &peer) {
            PeerStatus::Connected => {
                debug!(?peer, set, %index, "incoming from already connected peer");
                return Ok(());
            }
            PeerStatus::NotConnected => self.state.touch(set, &peer),
            PeerStatus::Unknown => self.state.discover(set, &peer)?,
        }

        let reputation = self.state.reputation(&peer)?;
        if reputation.is_banned() {
            debug!(?peer, set, %reputation, "rejecting banned peer");
            self.push(Message::Reject(index));
            return Ok(());
        }

        match self.state.try_accept_incoming(set, &peer) {
            Ok(()) => {
                debug!(?peer, set, %index, "incoming connection accepted");
                self.push(Message::Accept(index));
            }
            Err(err) if err.is_slots_unavailable() => {
                debug!(?peer, set, %index, "no inbound slot available");
                self.push(Message::Reject(index));
            }
            Err(err) => {
                warn!(?peer, set, %index, %err, "cannot accept incoming peer");
                self.push(Message::Reject(index));
            }
        }
        self.metrics.update_set(&self.state, set);
        Ok(())
    }

    /// The transport reports a closed or refused connection. No `Drop` is emitted.
    pub fn dropped(&mut self, set: SetId, peer: Id, reason: DropReason) -> Result<(), PeerSetError> {
        self.update_time();
        self.release(set, &peer)?;

        if reason == DropReason::Refused {
            self.remove_from_peer_set(set, peer)?;
        }
        self.alloc_slots(set)
    }

    /// Close our connection to a peer: penalise it, emit `Drop` and refill the slot.
    pub fn disconnect_peer(&mut self, set: SetId, peer: Id) -> Result<(), PeerSetError> {
        self.update_time();
        self.release(set, &peer)?;
        self.push(Message::Drop { set, peer });
        self.alloc_slots(set)
    }

    fn release(&mut self, set: SetId, peer: &Id) -> Result<(), PeerSetError> {
        self.check_set(set)?;
        if self.state.peer(set, peer) != PeerStatus::Connected {
            return Err(PeerSetError::DisconnectForNonConnectedPeer {
                peer: format!("{peer:?}"),
                set,
            });
        }

        self.state.add_reputation(peer, DISCONNECT_REPUTATION_CHANGE)?;
        self.state.disconnect(set, peer)
    }

    /// Connected peers of `set`, best first.
    pub fn sorted_peers(&self, set: SetId) -> Result<Vec<Id>, PeerSetError> {
        self.check_set(set)?;
        Ok(self.state.sorted_peers(set))
    }

    pub fn reputation(&self, peer: &Id) -> Result<Reputation, PeerSetError> {
        self.state.reputation(peer)
    }
}
