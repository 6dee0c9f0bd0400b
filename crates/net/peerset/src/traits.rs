//! Trait bounds for peer identifiers managed by the peer set.

use std::fmt::Debug;
use std::hash::Hash;

/// Blanket-implemented for any type with Clone + Eq + Ord + Hash + Send + Sync + Debug.
///
/// `Ord` gives slot allocation a deterministic tie-break between peers of equal
/// reputation. `libp2p::PeerId` satisfies every bound and is the default identifier.
pub trait NetPeerId: Clone + Eq + Ord + Hash + Send + Sync + Debug + 'static {}

impl<T> NetPeerId for T where T: Clone + Eq + Ord + Hash + Send + Sync + Debug + 'static {}
