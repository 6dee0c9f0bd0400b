//! Peer Set Metrics

use metrics::{Counter, Gauge};

use crate::message::Message;
use crate::state::{PeersState, SetId};
use crate::traits::NetPeerId;

/// Slot gauges of a single set.
#[derive(Clone, Debug)]
struct SetSlotMetrics {
    slots_in: Gauge,
    slots_out: Gauge,
}

impl SetSlotMetrics {
    fn new(set: SetId) -> Self {
        Self {
            slots_in: metrics::gauge!("peerset.slots.in", "set" => set.to_string()),
            slots_out: metrics::gauge!("peerset.slots.out", "set" => set.to_string()),
        }
    }
}

/// Peer Set Metrics
#[derive(Clone, Debug)]
pub struct PeerSetMetrics {
    /// Number of `Connect` directives emitted
    connect_total: Counter,
    /// Number of `Drop` directives emitted
    drop_total: Counter,
    /// Number of `Accept` directives emitted
    accept_total: Counter,
    /// Number of `Reject` directives emitted
    reject_total: Counter,
    /// Number of processed actions
    actions_total: Counter,
    /// Number of actions that failed and were dropped
    action_errors_total: Counter,
    /// Number of peers removed from the store
    peers_forgotten_total: Counter,
    /// Number of known peers
    nodes: Gauge,
    sets: Vec<SetSlotMetrics>,
}

impl PeerSetMetrics {
    pub fn new(num_sets: usize) -> Self {
        Self {
            connect_total: metrics::counter!("peerset.messages.connect"),
            drop_total: metrics::counter!("peerset.messages.drop"),
            accept_total: metrics::counter!("peerset.messages.accept"),
            reject_total: metrics::counter!("peerset.messages.reject"),
            actions_total: metrics::counter!("peerset.actions_total"),
            action_errors_total: metrics::counter!("peerset.action_errors_total"),
            peers_forgotten_total: metrics::counter!("peerset.peers_forgotten_total"),
            nodes: metrics::gauge!("peerset.nodes"),
            sets: (0..num_sets).map(SetSlotMetrics::new).collect(),
        }
    }

    pub(crate) fn record_message<Id>(&self, message: &Message<Id>) {
        match message {
            Message::Connect { .. } => self.connect_total.increment(1),
            Message::Drop { .. } => self.drop_total.increment(1),
            Message::Accept(_) => self.accept_total.increment(1),
            Message::Reject(_) => self.reject_total.increment(1),
        }
    }

    pub(crate) fn inc_actions(&self) {
        self.actions_total.increment(1);
    }

    pub(crate) fn inc_action_errors(&self) {
        self.action_errors_total.increment(1);
    }

    pub(crate) fn inc_forgotten(&self) {
        self.peers_forgotten_total.increment(1);
    }

    /// Refresh the node count and the slot usage of `set`.
    pub(crate) fn update_set<Id: NetPeerId>(&self, state: &PeersState<Id>, set: SetId) {
        self.nodes.set(state.num_nodes() as f64);
        if let (Some(gauges), Some(info)) = (self.sets.get(set), state.set_info(set)) {
            gauges.slots_in.set(f64::from(info.num_in()));
            gauges.slots_out.set(f64::from(info.num_out()));
        }
    }
}
