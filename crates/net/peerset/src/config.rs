//! Peer set configuration, loadable from TOML.

use std::path::Path;
use std::time::Duration;

use libp2p::PeerId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PeerSetError;

const DEFAULT_IN_PEERS: u32 = 25;
const DEFAULT_OUT_PEERS: u32 = 25;
const DEFAULT_ACTION_QUEUE_CAPACITY: usize = 256;
const DEFAULT_MESSAGE_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Configuration of a single peer set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetConfig<Id = PeerId> {
    /// Maximum number of slot-occupying inbound peers.
    pub in_peers: u32,
    /// Maximum number of slot-occupying outbound peers.
    pub out_peers: u32,
    /// Only dial and accept reserved peers.
    pub reserved_only: bool,
    /// Peers discovered into the set at startup.
    pub boot_nodes: Vec<Id>,
    /// Peers we always try to stay connected to. They never occupy a slot.
    pub reserved_nodes: Vec<Id>,
}

impl<Id> Default for SetConfig<Id> {
    fn default() -> Self {
        Self {
            in_peers: DEFAULT_IN_PEERS,
            out_peers: DEFAULT_OUT_PEERS,
            reserved_only: false,
            boot_nodes: Vec::new(),
            reserved_nodes: Vec::new(),
        }
    }
}

impl<Id> SetConfig<Id> {
    pub fn new(in_peers: u32, out_peers: u32) -> Self {
        Self {
            in_peers,
            out_peers,
            ..Default::default()
        }
    }

    /// Keep at least `min_peers` outbound and fill the rest of `max_peers` with inbound.
    pub fn from_peer_bounds(min_peers: u32, max_peers: u32) -> Self {
        Self::new(max_peers.saturating_sub(min_peers), min_peers)
    }

    pub fn with_boot_nodes(mut self, boot_nodes: impl IntoIterator<Item = Id>) -> Self {
        self.boot_nodes = boot_nodes.into_iter().collect();
        self
    }

    pub fn with_reserved_nodes(mut self, reserved_nodes: impl IntoIterator<Item = Id>) -> Self {
        self.reserved_nodes = reserved_nodes.into_iter().collect();
        self
    }

    pub fn with_reserved_only(mut self, reserved_only: bool) -> Self {
        self.reserved_only = reserved_only;
        self
    }
}

/// Peer set manager configuration: one [`SetConfig`] per set plus queue sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerSetConfig<Id = PeerId> {
    /// Capacity of the request queue. Producers wait when it is full.
    pub action_queue_capacity: usize,
    /// Capacity of the outbound message queue drained by the transport.
    pub message_queue_capacity: usize,
    /// Period of the reputation decay and slot allocation tick.
    pub tick_interval_ms: u64,
    pub sets: Vec<SetConfig<Id>>,
}

impl<Id> Default for PeerSetConfig<Id> {
    fn default() -> Self {
        Self {
            action_queue_capacity: DEFAULT_ACTION_QUEUE_CAPACITY,
            message_queue_capacity: DEFAULT_MESSAGE_QUEUE_CAPACITY,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            sets: vec![SetConfig::default()],
        }
    }
}

impl<Id> PeerSetConfig<Id> {
    pub fn new(sets: impl IntoIterator<Item = SetConfig<Id>>) -> Self {
        Self {
            sets: sets.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn with_set(mut self, set: SetConfig<Id>) -> Self {
        self.sets.push(set);
        self
    }

    pub fn with_action_queue_capacity(mut self, capacity: usize) -> Self {
        self.action_queue_capacity = capacity;
        self
    }

    pub fn with_message_queue_capacity(mut self, capacity: usize) -> Self {
        self.message_queue_capacity = capacity;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<(), PeerSetError> {
        if self.sets.is_empty() {
            return Err(PeerSetError::ConfigSetEmpty);
        }
        if self.action_queue_capacity == 0 {
            return Err(PeerSetError::Config(
                "action_queue_capacity must be non-zero".into(),
            ));
        }
        if self.message_queue_capacity == 0 {
            return Err(PeerSetError::Config(
                "message_queue_capacity must be non-zero".into(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(PeerSetError::Config(
                "tick_interval_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl<Id: DeserializeOwned> PeerSetConfig<Id> {
    pub fn from_toml_str(s: &str) -> Result<Self, PeerSetError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, PeerSetError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PeerSetConfig::<PeerId>::default();
        assert_eq!(config.sets.len(), 1);
        assert_eq!(config.sets[0].in_peers, 25);
        assert_eq!(config.sets[0].out_peers, 25);
        assert_eq!(config.action_queue_capacity, 256);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sets() {
        let config = PeerSetConfig::<String>::from_toml_str(
            r#"
            action_queue_capacity = 16
            tick_interval_ms = 500

            [[sets]]
            in_peers = 10
            out_peers = 5
            boot_nodes = ["boot1", "boot2"]

            [[sets]]
            reserved_only = true
            reserved_nodes = ["reserved"]
            "#,
        )
        .unwrap();

        assert_eq!(config.action_queue_capacity, 16);
        assert_eq!(config.message_queue_capacity, 1024);
        assert_eq!(config.tick_interval(), Duration::from_millis(500));
        assert_eq!(config.sets.len(), 2);
        assert_eq!(config.sets[0].in_peers, 10);
        assert_eq!(config.sets[0].out_peers, 5);
        assert_eq!(config.sets[0].boot_nodes, vec!["boot1", "boot2"]);
        assert!(!config.sets[0].reserved_only);
        assert!(config.sets[1].reserved_only);
        assert_eq!(config.sets[1].in_peers, 25);
        assert_eq!(config.sets[1].reserved_nodes, vec!["reserved"]);
    }

    #[test]
    fn test_empty_sets_rejected() {
        let result = PeerSetConfig::<String>::from_toml_str("sets = []");
        assert_matches!(result, Err(PeerSetError::ConfigSetEmpty));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = PeerSetConfig::<String>::from_toml_str("action_queue_capacity = 0");
        assert_matches!(result, Err(PeerSetError::Config(_)));

        let config = PeerSetConfig::<String>::default().with_tick_interval(Duration::ZERO);
        assert_matches!(config.validate(), Err(PeerSetError::Config(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let result = PeerSetConfig::<String>::from_toml_str("[[sets]]\nin_peers = \"many\"");
        assert_matches!(result, Err(PeerSetError::Config(_)));
    }

    #[test]
    fn test_peer_bounds() {
        let set = SetConfig::<PeerId>::from_peer_bounds(5, 50);
        assert_eq!(set.out_peers, 5);
        assert_eq!(set.in_peers, 45);

        let set = SetConfig::<PeerId>::from_peer_bounds(10, 5);
        assert_eq!(set.in_peers, 0);
    }

    #[test]
    fn test_libp2p_peer_ids_from_file() {
        let boot = PeerId::random();
        let reserved = PeerId::random();
        let config = PeerSetConfig::new([SetConfig::new(1, 2)
            .with_boot_nodes([boot])
            .with_reserved_nodes([reserved])]);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml::to_string(&config).unwrap().as_bytes())
            .unwrap();

        let loaded = PeerSetConfig::<PeerId>::from_toml_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let result = PeerSetConfig::<PeerId>::from_toml_file("/nonexistent/peerset.toml");
        assert_matches!(result, Err(PeerSetError::Io(_)));
    }
}
