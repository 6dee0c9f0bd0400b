//! Saturating reputation arithmetic, decay and the named reputation changes.

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// Reputation below which a peer is refused any connection.
pub const BANNED_THRESHOLD: Reputation = Reputation(82 * (i32::MIN / 100));

/// Applied when a connection to a peer ends.
pub const DISCONNECT_REPUTATION_CHANGE: Reputation = Reputation(-256);

/// Time a peer must stay disconnected at zero reputation before it is forgotten.
pub const FORGET_AFTER: Duration = Duration::from_secs(3600);

/// Each second reputation moves towards zero by `reputation / DECAY_DIVISOR`.
///
/// Multiplying by `k = 0.98` every second halves a reputation in
/// `ln(0.5) / ln(0.98) ≈ 34.3` seconds.
pub const DECAY_DIVISOR: i32 = 50;

/// A peer's reputation, saturating at the bounds of `i32`.
///
/// Zero is the neutral value: peers start there and decay back towards it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reputation(i32);

impl Reputation {
    pub const NEUTRAL: Self = Self(0);
    pub const MIN: Self = Self(i32::MIN);
    pub const MAX: Self = Self(i32::MAX);

    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i32 {
        self.0
    }

    pub const fn is_neutral(self) -> bool {
        self.0 == 0
    }

    pub const fn is_banned(self) -> bool {
        self.0 < BANNED_THRESHOLD.0
    }

    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// One second of decay towards zero.
    ///
    /// The step is at least one so small values reach exactly zero instead of
    /// stalling at `±1..49`.
    #[must_use]
    pub const fn decay(self) -> Self {
        let mut diff = self.0 / DECAY_DIVISOR;
        if diff == 0 {
            diff = self.0.signum();
        }
        Self(self.0.saturating_sub(diff))
    }
}

impl Add for Reputation {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl Sub for Reputation {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

impl From<i32> for Reputation {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<Reputation> for i32 {
    fn from(reputation: Reputation) -> Self {
        reputation.0
    }
}

impl fmt::Display for Reputation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A reputation adjustment reported against a peer, with a human readable reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReputationChange {
    pub value: Reputation,
    pub reason: &'static str,
}

impl ReputationChange {
    pub const fn new(value: i32, reason: &'static str) -> Self {
        Self {
            value: Reputation(value),
            reason,
        }
    }

    /// A change that bans the peer outright.
    pub const fn new_fatal(reason: &'static str) -> Self {
        Self::new(i32::MIN, reason)
    }
}

impl fmt::Display for ReputationChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value: {}, reason: {}", self.value, self.reason)
    }
}

/// Reputation changes reported by the protocols running on top of the peer set.
pub mod changes {
    use super::ReputationChange;

    pub const BAD_MESSAGE: ReputationChange = ReputationChange::new(-(1 << 12), "Bad message");
    pub const TIMEOUT: ReputationChange = ReputationChange::new(-(1 << 10), "Request timeout");
    pub const GOSSIP_SUCCESS: ReputationChange =
        ReputationChange::new(1 << 4, "Successful gossip");
    pub const DUPLICATE_GOSSIP: ReputationChange =
        ReputationChange::new(-(1 << 2), "Duplicate gossip");
    pub const GOOD_TRANSACTION: ReputationChange =
        ReputationChange::new(1 << 7, "Good transaction");
    pub const BAD_TRANSACTION: ReputationChange =
        ReputationChange::new(-(1 << 12), "Bad transaction");
    pub const GENESIS_MISMATCH: ReputationChange = ReputationChange::new_fatal("Genesis mismatch");
    pub const BENEFIT_NOTIFY_GOOD: ReputationChange =
        ReputationChange::new(10_000, "Useful notification");
    pub const REPORT_BAD_COLLATOR: ReputationChange =
        ReputationChange::new_fatal("A collator was reported by another subsystem");
    pub const BAD_PROTOCOL: ReputationChange = ReputationChange::new_fatal("Unsupported protocol");
    pub const BAD_BLOCK_ANNOUNCEMENT: ReputationChange =
        ReputationChange::new(-(1 << 12), "Bad block announcement");
    pub const INCOMPLETE_HEADER: ReputationChange =
        ReputationChange::new(-(1 << 20), "Incomplete header");
    pub const NOT_RELEVANT_BLOCK_ANNOUNCE: ReputationChange =
        ReputationChange::new(-(1 << 8), "Not relevant block announce");
    pub const UNEXPECTED_RESPONSE: ReputationChange =
        ReputationChange::new(-(1 << 29), "Unexpected response");
    pub const BAD_JUSTIFICATION: ReputationChange =
        ReputationChange::new(-(1 << 16), "Bad justification");
    pub const BAD_WARP_PROOF: ReputationChange =
        ReputationChange::new(-(1 << 29), "Bad warp proof");
    pub const UNEXPECTED_MESSAGE: ReputationChange =
        ReputationChange::new(-(1 << 12), "Unexpected message");
    pub const INVALID_SIGNATURE: ReputationChange =
        ReputationChange::new(-(1 << 14), "Invalid signature");
    pub const WRONG_PARA: ReputationChange =
        ReputationChange::new(-(1 << 10), "Collation for a wrong para");
    pub const UNNEEDED_COLLATOR: ReputationChange =
        ReputationChange::new(-(1 << 12), "Unneeded collator");
    pub const BANNED: ReputationChange = ReputationChange::new_fatal("Banned");
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_banned_threshold_value() {
        assert_eq!(BANNED_THRESHOLD.value(), -1_760_936_552);
        assert!(Reputation::new(BANNED_THRESHOLD.value() - 1).is_banned());
        assert!(!BANNED_THRESHOLD.is_banned());
        assert!(Reputation::MIN.is_banned());
        assert!(!Reputation::NEUTRAL.is_banned());
    }

    #[test]
    fn test_saturation_at_bounds() {
        assert_eq!(Reputation::MAX + Reputation::new(1), Reputation::MAX);
        assert_eq!(Reputation::MIN + Reputation::new(-1), Reputation::MIN);
        assert_eq!(Reputation::MIN - Reputation::new(1), Reputation::MIN);
        assert_eq!(Reputation::MAX - Reputation::new(-1), Reputation::MAX);
        assert_eq!(Reputation::new(10) - Reputation::new(15), Reputation::new(-5));
    }

    #[test]
    fn test_decay_reaches_zero() {
        assert_eq!(Reputation::new(100).decay(), Reputation::new(98));
        assert_eq!(Reputation::new(-100).decay(), Reputation::new(-98));
        assert_eq!(Reputation::new(49).decay(), Reputation::new(48));
        assert_eq!(Reputation::new(-1).decay(), Reputation::NEUTRAL);
        assert_eq!(Reputation::new(1).decay(), Reputation::NEUTRAL);
        assert_eq!(Reputation::NEUTRAL.decay(), Reputation::NEUTRAL);
        assert_eq!(Reputation::MIN.decay().value(), i32::MIN - i32::MIN / 50);
    }

    #[test]
    fn test_banned_peer_recovers_after_one_second() {
        let banned = Reputation::new(BANNED_THRESHOLD.value() - 1);
        assert!(banned.is_banned());
        assert!(!banned.decay().is_banned());
    }

    #[test]
    fn test_half_life() {
        let mut reputation = Reputation::new(1 << 20);
        for _ in 0..34 {
            reputation = reputation.decay();
        }
        assert!(reputation.value() > (1 << 19));
        reputation = reputation.decay();
        assert!(reputation.value() < (1 << 19));
    }

    #[test]
    fn test_fatal_changes() {
        assert_eq!(changes::GENESIS_MISMATCH.value, Reputation::MIN);
        assert_eq!(changes::REPORT_BAD_COLLATOR.value, Reputation::MIN);
        assert_eq!(changes::BAD_MESSAGE.value.value(), -4096);
        assert_eq!(changes::TIMEOUT.value.value(), -1024);
        assert_eq!(changes::GOSSIP_SUCCESS.value.value(), 16);
        assert_eq!(changes::DUPLICATE_GOSSIP.value.value(), -4);
        assert_eq!(changes::GOOD_TRANSACTION.value.value(), 128);
        assert_eq!(changes::BENEFIT_NOTIFY_GOOD.value.value(), 10_000);
    }

    proptest! {
        #[test]
        fn test_repeated_add_saturates(start in any::<i32>(), delta in any::<i32>(), times in 1usize..64) {
            let mut reputation = Reputation::new(start);
            for _ in 0..times {
                let next = reputation + Reputation::new(delta);
                let expected = (reputation.value() as i64 + delta as i64)
                    .clamp(i32::MIN as i64, i32::MAX as i64);
                prop_assert_eq!(next.value() as i64, expected);
                reputation = next;
            }
        }

        #[test]
        fn test_sub_saturates(a in any::<i32>(), b in any::<i32>()) {
            let expected = (a as i64 - b as i64).clamp(i32::MIN as i64, i32::MAX as i64);
            prop_assert_eq!((Reputation::new(a) - Reputation::new(b)).value() as i64, expected);
        }

        #[test]
        fn test_decay_moves_towards_zero(value in any::<i32>()) {
            let decayed = Reputation::new(value).decay().value();
            prop_assert!(decayed.unsigned_abs() <= value.unsigned_abs());
            prop_assert_eq!(decayed.signum() * value.signum() >= 0, true);
            if value != 0 {
                prop_assert!(decayed.unsigned_abs() < value.unsigned_abs());
            }
        }
    }
}
