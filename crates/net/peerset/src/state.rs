//! Authoritative per-peer, per-set membership and reputation store.
//!
//! [`PeersState`] only tracks slots. It has no concurrency of its own: the
//! peer set service is its single owner and single writer.

use std::collections::{HashMap, HashSet};
use std::fmt;

use libp2p::PeerId;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::SetConfig;
use crate::error::PeerSetError;
use crate::reputation::Reputation;
use crate::traits::NetPeerId;

/// Index of a peer set, in configuration order.
pub type SetId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("inbound"),
            Self::Outbound => f.write_str("outbound"),
        }
    }
}

/// Membership of a node in one set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MembershipState {
    /// Not part of the set.
    #[default]
    NotMember,
    /// Connected through an inbound connection.
    In,
    /// Connected through an outbound connection.
    Out,
    /// Part of the set, but currently not connected.
    NotConnected,
}

impl MembershipState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::In | Self::Out)
    }

    pub fn is_member(&self) -> bool {
        !matches!(self, Self::NotMember)
    }
}

/// Classification of a peer within one set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Connected,
    NotConnected,
    Unknown,
}

/// A known peer.
#[derive(Debug, Clone)]
pub struct Node {
    /// One entry per configured set.
    sets: Vec<MembershipState>,
    /// Per set, when we were last connected, or when the peer was discovered.
    last_connected: Vec<Instant>,
    reputation: Reputation,
}

impl Node {
    fn new(num_sets: usize, now: Instant) -> Self {
        Self {
            sets: vec![MembershipState::NotMember; num_sets],
            last_connected: vec![now; num_sets],
            reputation: Reputation::NEUTRAL,
        }
    }

    pub fn reputation(&self) -> Reputation {
        self.reputation
    }

    pub fn membership(&self, set: SetId) -> MembershipState {
        self.sets.get(set).copied().unwrap_or_default()
    }

    /// `(set, membership, last connected)` for every set.
    pub fn memberships(&self) -> impl Iterator<Item = (SetId, MembershipState, Instant)> + '_ {
        self.sets
            .iter()
            .zip(&self.last_connected)
            .enumerate()
            .map(|(set, (state, last))| (set, *state, *last))
    }

    fn is_member_of_any(&self) -> bool {
        self.sets.iter().any(MembershipState::is_member)
    }
}

/// Slot accounting of a single set.
#[derive(Debug, Clone)]
pub struct SetInfo<Id = PeerId> {
    num_in: u32,
    num_out: u32,
    max_in: u32,
    max_out: u32,
    /// Peers, discovered or not, that never occupy a slot.
    no_slot_nodes: HashSet<Id>,
}

impl<Id: NetPeerId> SetInfo<Id> {
    fn new(max_in: u32, max_out: u32) -> Self {
        Self {
            num_in: 0,
            num_out: 0,
            max_in,
            max_out,
            no_slot_nodes: HashSet::new(),
        }
    }

    pub fn num_in(&self) -> u32 {
        self.num_in
    }

    pub fn num_out(&self) -> u32 {
        self.num_out
    }

    pub fn max_in(&self) -> u32 {
        self.max_in
    }

    pub fn max_out(&self) -> u32 {
        self.max_out
    }

    pub fn is_no_slot(&self, id: &Id) -> bool {
        self.no_slot_nodes.contains(id)
    }

    /// Either counter above its maximum. Only reachable transiently, right
    /// after a connected peer stops being a no-slot node.
    pub fn is_over_capacity(&self) -> bool {
        self.num_in > self.max_in || self.num_out > self.max_out
    }

    fn has_free_slot(&self, direction: Direction) -> bool {
        match direction {
            Direction::Inbound => self.num_in < self.max_in,
            Direction::Outbound => self.num_out < self.max_out,
        }
    }
}

/// Every node we know about, and the slot accounting of every set.
#[derive(Debug)]
pub struct PeersState<Id: NetPeerId = PeerId> {
    nodes: HashMap<Id, Node>,
    /// Never resized after construction.
    sets: Vec<SetInfo<Id>>,
}

impl<Id: NetPeerId> PeersState<Id> {
    pub fn new(configs: &[SetConfig<Id>]) -> Result<Self, PeerSetError> {
        if configs.is_empty() {
            return Err(PeerSetError::ConfigSetEmpty);
        }

        Ok(Self {
            nodes: HashMap::new(),
            sets: configs
                .iter()
                .map(|cfg| SetInfo::new(cfg.in_peers, cfg.out_peers))
                .collect(),
        })
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    pub fn set_info(&self, set: SetId) -> Option<&SetInfo<Id>> {
        self.sets.get(set)
    }

    /// Number of known nodes, members of a set or not.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&Id, &Node)> {
        self.nodes.iter()
    }

    pub fn node(&self, id: &Id) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn peer(&self, set: SetId, id: &Id) -> PeerStatus {
        match self.nodes.get(id).map(|node| node.membership(set)) {
            Some(MembershipState::In | MembershipState::Out) => PeerStatus::Connected,
            Some(MembershipState::NotConnected) => PeerStatus::NotConnected,
            Some(MembershipState::NotMember) | None => PeerStatus::Unknown,
        }
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

    /// Make the peer a member of `set`, creating it with neutral reputation if unknown.
    ///
    /// No-op if the peer is already a member of the set.
    pub fn discover(&mut self, set: SetId, id: &Id) -> Result<(), PeerSetError> {
        self.check_set(set)?;
        let num_sets = self.sets.len();
        let now = Instant::now();

        let node = self
            .nodes
            .entry(id.clone())
            .or_insert_with(|| Node::new(num_sets, now));

        if let (Some(state), Some(last)) = (node.sets.get_mut(set), node.last_connected.get_mut(set))
        {
            if !state.is_member() {
                trace!(?id, set, "peer discovered");
                *state = MembershipState::NotConnected;
                *last = now;
            }
        }
        Ok(())
    }

    pub fn reputation(&self, id: &Id) -> Result<Reputation, PeerSetError> {
        self.nodes
            .get(id)
            .map(Node::reputation)
            .ok_or_else(|| PeerSetError::unknown_peer(id))
    }

    /// Saturating add; returns the new reputation.
    pub fn add_reputation(
        &mut self,
        id: &Id,
        change: Reputation,
    ) -> Result<Reputation, PeerSetError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| PeerSetError::unknown_peer(id))?;
        node.reputation = node.reputation + change;
        Ok(node.reputation)
    }

    /// Decay every reputation by one second. Returns whether any reputation is still non-zero.
    pub fn decay_reputations(&mut self) -> bool {
        let mut any_non_neutral = false;
        for node in self.nodes.values_mut() {
            node.reputation = node.reputation.decay();
            any_non_neutral |= !node.reputation.is_neutral();
        }
        any_non_neutral
    }

    pub fn has_free_outgoing_slot(&self, set: SetId) -> bool {
        self.sets
            .get(set)
            .is_some_and(|info| info.has_free_slot(Direction::Outbound))
    }

    /// Switch a not-connected peer to an outbound connection if a slot is free.
    ///
    /// No-slot peers always succeed and are not counted. Otherwise fails with
    /// [`PeerSetError::SlotsUnavailable`] and the peer stays not connected.
    pub fn try_outgoing(&mut self, set: SetId, id: &Id) -> Result<(), PeerSetError> {
        self.try_connect(set, id, Direction::Outbound)
    }

    /// Inbound counterpart of [`Self::try_outgoing`]: accepts when a free inbound slot exists.
    pub fn try_accept_incoming(&mut self, set: SetId, id: &Id) -> Result<(), PeerSetError> {
        self.try_connect(set, id, Direction::Inbound)
    }

    fn try_connect(
        &mut self,
        set: SetId,
        id: &Id,
        direction: Direction,
    ) -> Result<(), PeerSetError> {
        self.check_set(set)?;
        let (Some(info), Some(node)) = (self.sets.get_mut(set), self.nodes.get_mut(id)) else {
            return Err(PeerSetError::unknown_peer(id));
        };
        let Some(state) = node.sets.get_mut(set) else {
            return Err(PeerSetError::unknown_peer(id));
        };

        match *state {
            MembershipState::NotConnected => {}
            MembershipState::In | MembershipState::Out => {
                return Err(PeerSetError::PeerAlreadyConnected {
                    peer: format!("{id:?}"),
                    set,
                });
            }
            MembershipState::NotMember => return Err(PeerSetError::unknown_peer(id)),
        }

        let no_slot = info.no_slot_nodes.contains(id);
        if !no_slot && !info.has_free_slot(direction) {
            return Err(PeerSetError::SlotsUnavailable { set, direction });
        }

        match direction {
            Direction::Inbound => {
                *state = MembershipState::In;
                if !no_slot {
                    info.num_in += 1;
                }
            }
            Direction::Outbound => {
                *state = MembershipState::Out;
                if !no_slot {
                    info.num_out += 1;
                }
            }
        }
        Ok(())
    }

    /// Mark a connected peer as not connected, releasing its slot.
    pub fn disconnect(&mut self, set: SetId, id: &Id) -> Result<(), PeerSetError> {
        self.check_set(set)?;
        let (Some(info), Some(node)) = (self.sets.get_mut(set), self.nodes.get_mut(id)) else {
            return Err(PeerSetError::unknown_peer(id));
        };
        let (Some(state), Some(last)) = (node.sets.get_mut(set), node.last_connected.get_mut(set))
        else {
            return Err(PeerSetError::unknown_peer(id));
        };

        let no_slot = info.no_slot_nodes.contains(id);
        match *state {
            MembershipState::In if !no_slot => info.num_in = info.num_in.saturating_sub(1),
            MembershipState::Out if !no_slot => info.num_out = info.num_out.saturating_sub(1),
            MembershipState::In | MembershipState::Out => {}
            MembershipState::NotConnected | MembershipState::NotMember => {
                return Err(PeerSetError::PeerAlreadyDisconnected {
                    peer: format!("{id:?}"),
                    set,
                });
            }
        }

        *state = MembershipState::NotConnected;
        *last = Instant::now();
        Ok(())
    }

    /// Refresh the last-connected instant of a not-connected member.
    pub fn touch(&mut self, set: SetId, id: &Id) {
        if let Some(node) = self.nodes.get_mut(id) {
            if node.membership(set) == MembershipState::NotConnected {
                if let Some(last) = node.last_connected.get_mut(set) {
                    *last = Instant::now();
                }
            }
        }
    }

    /// Add a peer to the no-slot nodes of `set`, releasing any slot it holds.
    ///
    /// The peer does not need to be known yet.
    pub fn add_no_slot_node(&mut self, set: SetId, id: &Id) -> Result<(), PeerSetError> {
        self.check_set(set)?;
        let Some(info) = self.sets.get_mut(set) else {
            return Ok(());
        };
        if !info.no_slot_nodes.insert(id.clone()) {
            debug!(?id, set, "peer already a no-slot node");
            return Ok(());
        }

        match self.nodes.get(id).map(|node| node.membership(set)) {
            Some(MembershipState::In) => info.num_in = info.num_in.saturating_sub(1),
            Some(MembershipState::Out) => info.num_out = info.num_out.saturating_sub(1),
            _ => {}
        }
        Ok(())
    }

    /// Remove a peer from the no-slot nodes of `set`; a connected peer takes a slot again.
    pub fn remove_no_slot_node(&mut self, set: SetId, id: &Id) -> Result<(), PeerSetError> {
        self.check_set(set)?;
        let Some(info) = self.sets.get_mut(set) else {
            return Ok(());
        };
        if !info.no_slot_nodes.remove(id) {
            debug!(?id, set, "peer not a no-slot node");
            return Ok(());
        }

        match self.nodes.get(id).map(|node| node.membership(set)) {
            Some(MembershipState::In) => info.num_in = info.num_in.saturating_add(1),
            Some(MembershipState::Out) => info.num_out = info.num_out.saturating_add(1),
            _ => {}
        }
        Ok(())
    }

    /// Remove the peer from `set`. Returns `true` if the node was dropped from the store
    /// because it is a member of no set and its reputation is exactly zero.
    pub fn forget_peer(&mut self, set: SetId, id: &Id) -> Result<bool, PeerSetError> {
        self.check_set(set)?;
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| PeerSetError::unknown_peer(id))?;
        let Some(state) = node.sets.get_mut(set) else {
            return Err(PeerSetError::unknown_peer(id));
        };
        if state.is_connected() {
            return Err(PeerSetError::PeerAlreadyConnected {
                peer: format!("{id:?}"),
                set,
            });
        }
        *state = MembershipState::NotMember;

        if !node.reputation.is_neutral() || node.is_member_of_any() {
            return Ok(false);
        }

        self.nodes.remove(id);
        debug!(?id, remaining = self.nodes.len(), "peer removed from peer set");
        Ok(true)
    }

    /// The not-connected member of `set` with the highest reputation.
    ///
    /// Ties go to the smallest peer id.
    pub fn highest_not_connected_peer(&self, set: SetId) -> Option<Id> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.membership(set) == MembershipState::NotConnected)
            .max_by(|(a_id, a), (b_id, b)| {
                a.reputation
                    .cmp(&b.reputation)
                    .then_with(|| b_id.cmp(a_id))
            })
            .map(|(id, _)| id.clone())
    }

    /// Connected peers of `set`, highest reputation first.
    pub fn sorted_peers(&self, set: SetId) -> Vec<Id> {
        let mut connected: Vec<(&Id, Reputation)> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.membership(set).is_connected())
            .map(|(id, node)| (id, node.reputation))
            .collect();

        connected.sort_by(|(a_id, a), (b_id, b)| b.cmp(a).then_with(|| a_id.cmp(b_id)));
        connected.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Drop every node with zero reputation that is a member of no set.
    ///
    /// Such nodes are left behind when a peer is forgotten from its last set
    /// while its reputation is still decaying. Returns how many were removed.
    pub fn remove_neutral_non_members(&mut self) -> usize {
        let before = self.nodes.len();
        self.nodes
            .retain(|_, node| !node.reputation.is_neutral() || node.is_member_of_any());

        let removed = before - self.nodes.len();
        if removed > 0 {
            debug!(removed, remaining = self.nodes.len(), "removed neutral non-member peers");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const PEER1: u64 = 1;
    const PEER2: u64 = 2;

    fn test_state(in_peers: u32, out_peers: u32) -> PeersState<u64> {
        PeersState::new(&[SetConfig::new(in_peers, out_peers)]).unwrap()
    }

    #[test]
    fn test_empty_config() {
        assert_matches!(PeersState::<u64>::new(&[]), Err(PeerSetError::ConfigSetEmpty));
    }

    #[test]
    fn test_full_slot_in() {
        let mut state = test_state(1, 1);

        assert_eq!(state.peer(0, &PEER1), PeerStatus::Unknown);
        state.discover(0, &PEER1).unwrap();
        assert_eq!(state.peer(0, &PEER1), PeerStatus::NotConnected);
        state.try_accept_incoming(0, &PEER1).unwrap();
        assert_eq!(state.peer(0, &PEER1), PeerStatus::Connected);

        state.discover(0, &PEER2).unwrap();
        assert_matches!(
            state.try_accept_incoming(0, &PEER2),
            Err(PeerSetError::SlotsUnavailable {
                set: 0,
                direction: Direction::Inbound
            })
        );
        assert_eq!(state.peer(0, &PEER2), PeerStatus::NotConnected);
    }

    #[test]
    fn test_full_slot_out() {
        let mut state = test_state(1, 1);

        state.discover(0, &PEER1).unwrap();
        state.try_outgoing(0, &PEER1).unwrap();
        state.discover(0, &PEER2).unwrap();
        let err = state.try_outgoing(0, &PEER2).unwrap_err();
        assert!(err.is_slots_unavailable());
        assert_eq!(state.set_info(0).unwrap().num_out(), 1);
    }

    #[test]
    fn test_no_slot_node_doesnt_occupy_slot() {
        let mut state = test_state(1, 1);

        state.add_no_slot_node(0, &PEER1).unwrap();
        assert_eq!(state.peer(0, &PEER1), PeerStatus::Unknown);
        state.discover(0, &PEER1).unwrap();
        state.try_accept_incoming(0, &PEER1).unwrap();
        assert_eq!(state.peer(0, &PEER1), PeerStatus::Connected);
        assert_eq!(state.set_info(0).unwrap().num_in(), 0);

        state.discover(0, &PEER2).unwrap();
        state.try_accept_incoming(0, &PEER2).unwrap();
        assert_eq!(state.peer(0, &PEER2), PeerStatus::Connected);
        assert_eq!(state.set_info(0).unwrap().num_in(), 1);
    }

    #[test]
    fn test_disconnecting_frees_slot() {
        let mut state = test_state(1, 1);

        state.discover(0, &PEER1).unwrap();
        state.try_accept_incoming(0, &PEER1).unwrap();
        state.discover(0, &PEER2).unwrap();
        assert!(state.try_accept_incoming(0, &PEER2).is_err());

        state.disconnect(0, &PEER1).unwrap();
        assert_eq!(state.peer(0, &PEER1), PeerStatus::NotConnected);
        state.try_accept_incoming(0, &PEER2).unwrap();
    }

    #[test]
    fn test_disconnect_no_slot_node() {
        let mut state = test_state(1, 1);

        state.add_no_slot_node(0, &PEER1).unwrap();
        state.discover(0, &PEER1).unwrap();
        state.try_outgoing(0, &PEER1).unwrap();
        assert_eq!(state.peer(0, &PEER1), PeerStatus::Connected);

        state.disconnect(0, &PEER1).unwrap();
        assert_eq!(state.peer(0, &PEER1), PeerStatus::NotConnected);
        assert_eq!(state.set_info(0).unwrap().num_out(), 0);
    }

    #[test]
    fn test_disconnect_twice() {
        let mut state = test_state(1, 1);

        state.discover(0, &PEER1).unwrap();
        state.try_outgoing(0, &PEER1).unwrap();
        state.disconnect(0, &PEER1).unwrap();
        assert_matches!(
            state.disconnect(0, &PEER1),
            Err(PeerSetError::PeerAlreadyDisconnected { set: 0, .. })
        );
        assert_matches!(
            state.disconnect(0, &PEER2),
            Err(PeerSetError::PeerDoesNotExist { .. })
        );
    }

    #[test]
    fn test_connect_requires_membership() {
        let mut state = test_state(1, 1);

        assert_matches!(
            state.try_outgoing(0, &PEER1),
            Err(PeerSetError::PeerDoesNotExist { .. })
        );
        state.discover(0, &PEER1).unwrap();
        state.try_outgoing(0, &PEER1).unwrap();
        assert_matches!(
            state.try_accept_incoming(0, &PEER1),
            Err(PeerSetError::PeerAlreadyConnected { .. })
        );
        assert_matches!(
            state.discover(3, &PEER1),
            Err(PeerSetError::SetOutOfRange { set: 3, num_sets: 1 })
        );
    }

    #[test]
    fn test_no_slot_toggle_moves_accounting() {
        let mut state = test_state(2, 2);

        state.discover(0, &PEER1).unwrap();
        state.try_outgoing(0, &PEER1).unwrap();
        assert_eq!(state.set_info(0).unwrap().num_out(), 1);

        state.add_no_slot_node(0, &PEER1).unwrap();
        assert_eq!(state.set_info(0).unwrap().num_out(), 0);
        assert!(state.set_info(0).unwrap().is_no_slot(&PEER1));

        // adding twice has no effect
        state.add_no_slot_node(0, &PEER1).unwrap();
        assert_eq!(state.set_info(0).unwrap().num_out(), 0);

        state.remove_no_slot_node(0, &PEER1).unwrap();
        assert_eq!(state.set_info(0).unwrap().num_out(), 1);
        state.remove_no_slot_node(0, &PEER1).unwrap();
        assert_eq!(state.set_info(0).unwrap().num_out(), 1);
    }

    #[test]
    fn test_highest_not_connected_peer() {
        let mut state = test_state(25, 25);
        assert_eq!(state.highest_not_connected_peer(0), None);

        state.discover(0, &PEER1).unwrap();
        state.add_reputation(&PEER1, Reputation::new(50)).unwrap();
        state.discover(0, &PEER2).unwrap();
        state.add_reputation(&PEER2, Reputation::new(25)).unwrap();
        assert_eq!(state.highest_not_connected_peer(0), Some(PEER1));

        state.add_reputation(&PEER2, Reputation::new(50)).unwrap();
        assert_eq!(state.highest_not_connected_peer(0), Some(PEER2));

        state.try_accept_incoming(0, &PEER2).unwrap();
        assert_eq!(state.highest_not_connected_peer(0), Some(PEER1));

        state.disconnect(0, &PEER2).unwrap();
        state.add_reputation(&PEER1, Reputation::new(50)).unwrap();
        assert_eq!(state.highest_not_connected_peer(0), Some(PEER1));
    }

    #[test]
    fn test_highest_not_connected_tie_break() {
        let mut state = test_state(25, 25);
        for id in [7u64, 3, 9, 5] {
            state.discover(0, &id).unwrap();
        }
        assert_eq!(state.highest_not_connected_peer(0), Some(3));
    }

    #[test]
    fn test_sorted_peers() {
        let mut state = test_state(2, 1);

        state.add_no_slot_node(0, &PEER1).unwrap();
        state.discover(0, &PEER1).unwrap();
        state.try_accept_incoming(0, &PEER1).unwrap();
        state.discover(0, &PEER2).unwrap();
        state.try_accept_incoming(0, &PEER2).unwrap();
        state.add_reputation(&PEER2, Reputation::new(10)).unwrap();
        state.discover(0, &3).unwrap();

        assert_eq!(state.sorted_peers(0), vec![PEER2, PEER1]);
    }

    #[test]
    fn test_forget_peer_removes_neutral_non_member() {
        let mut state = PeersState::new(&[SetConfig::new(1, 1), SetConfig::new(1, 1)]).unwrap();

        state.discover(0, &PEER1).unwrap();
        state.discover(1, &PEER1).unwrap();

        assert!(!state.forget_peer(0, &PEER1).unwrap());
        assert_eq!(state.peer(0, &PEER1), PeerStatus::Unknown);
        assert_eq!(state.peer(1, &PEER1), PeerStatus::NotConnected);

        assert!(state.forget_peer(1, &PEER1).unwrap());
        assert!(!state.contains(&PEER1));
    }

    #[test]
    fn test_forget_peer_keeps_reputation() {
        let mut state = test_state(1, 1);

        state.discover(0, &PEER1).unwrap();
        state.add_reputation(&PEER1, Reputation::new(-10)).unwrap();
        assert!(!state.forget_peer(0, &PEER1).unwrap());
        assert!(state.contains(&PEER1));
        assert_eq!(state.peer(0, &PEER1), PeerStatus::Unknown);
        assert_eq!(state.reputation(&PEER1).unwrap(), Reputation::new(-10));
    }

    #[test]
    fn test_forget_connected_peer_rejected() {
        let mut state = test_state(1, 1);

        state.discover(0, &PEER1).unwrap();
        state.try_outgoing(0, &PEER1).unwrap();
        assert_matches!(
            state.forget_peer(0, &PEER1),
            Err(PeerSetError::PeerAlreadyConnected { .. })
        );
        assert_eq!(state.set_info(0).unwrap().num_out(), 1);
    }

    #[test]
    fn test_remove_neutral_non_members() {
        let mut state = test_state(1, 1);
        state.discover(0, &PEER1).unwrap();
        state.discover(0, &PEER2).unwrap();
        state.add_reputation(&PEER1, Reputation::new(-1)).unwrap();
        state.forget_peer(0, &PEER1).unwrap();
        assert_eq!(state.remove_neutral_non_members(), 0);

        assert!(!state.decay_reputations());
        assert_eq!(state.remove_neutral_non_members(), 1);
        assert!(!state.contains(&PEER1));
        assert!(state.contains(&PEER2));
    }

    #[test]
    fn test_discover_into_second_set() {
        let mut state = PeersState::new(&[SetConfig::new(1, 1), SetConfig::new(1, 1)]).unwrap();

        state.discover(0, &PEER1).unwrap();
        assert_eq!(state.peer(1, &PEER1), PeerStatus::Unknown);
        state.discover(1, &PEER1).unwrap();
        assert_eq!(state.peer(1, &PEER1), PeerStatus::NotConnected);
        assert_eq!(state.num_nodes(), 1);
    }

    #[test]
    fn test_decay_reputations() {
        let mut state = test_state(1, 1);
        assert!(!state.decay_reputations());

        state.discover(0, &PEER1).unwrap();
        state.add_reputation(&PEER1, Reputation::new(2)).unwrap();
        assert!(state.decay_reputations());
        assert_eq!(state.reputation(&PEER1).unwrap(), Reputation::new(1));
        assert!(!state.decay_reputations());
        assert_eq!(state.reputation(&PEER1).unwrap(), Reputation::NEUTRAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_connected_tracks_disconnect() {
        let mut state = test_state(1, 1);

        let last_connected = |state: &PeersState<u64>| {
            let (_, _, last) = state.node(&PEER1).unwrap().memberships().next().unwrap();
            last
        };

        state.discover(0, &PEER1).unwrap();
        let discovered = last_connected(&state);

        state.try_outgoing(0, &PEER1).unwrap();
        tokio::time::advance(std::time::Duration::from_secs(10)).await;
        state.disconnect(0, &PEER1).unwrap();

        let disconnected = last_connected(&state);
        assert_eq!(disconnected - discovered, std::time::Duration::from_secs(10));
    }
}
