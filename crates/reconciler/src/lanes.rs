//! Lane bitsets: update priorities as disjoint powers of two.
//!
//! Numerically smaller lanes are more urgent, so the highest-priority lane of a
//! set is its lowest set bit.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};
use scheduler::PriorityLevel;

/// A set of lanes. A single-bit value doubles as one lane.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Lanes(u32);

/// Alias used where exactly one lane is expected.
pub type Lane = Lanes;

impl Lanes {
    /// Empty set. Also the wildcard lane: it is a subset of every render lane.
    pub const NO_LANE: Self = Self(0);
    /// Discrete input and explicit renders; flushed in a microtask.
    pub const SYNC: Self = Self(1 << 0);
    /// Continuous input such as pointer moves.
    pub const INPUT_CONTINUOUS: Self = Self(1 << 1);
    /// Ordinary updates.
    pub const DEFAULT: Self = Self(1 << 2);
    /// Work that only runs when nothing else is pending.
    pub const IDLE: Self = Self(1 << 29);

    /// Wrap raw lane bits.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw lane bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// No lane is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union of two sets.
    #[inline]
    pub const fn merge(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// The most urgent lane in the set (lowest set bit).
    #[inline]
    pub const fn highest_priority(self) -> Self {
        Self(self.0 & self.0.wrapping_neg())
    }

    /// `self ⊆ set`.
    #[inline]
    pub const fn is_subset_of(self, set: Self) -> bool {
        (self.0 & set.0) == self.0
    }

    /// Whether the two sets share any lane.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Set difference.
    #[inline]
    pub const fn remove(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Scheduler priority for the most urgent lane in the set.
    pub const fn to_priority(self) -> PriorityLevel {
        let lane = self.highest_priority();
        if lane.0 == Self::SYNC.0 {
            PriorityLevel::Immediate
        } else if lane.0 == Self::INPUT_CONTINUOUS.0 {
            PriorityLevel::UserBlocking
        } else if lane.0 == Self::DEFAULT.0 {
            PriorityLevel::Normal
        } else {
            PriorityLevel::Idle
        }
    }

    /// Lane used for updates requested at `level`.
    pub const fn from_priority(level: PriorityLevel) -> Self {
        match level {
            PriorityLevel::Immediate => Self::SYNC,
            PriorityLevel::UserBlocking => Self::INPUT_CONTINUOUS,
            PriorityLevel::Normal => Self::DEFAULT,
            PriorityLevel::Low | PriorityLevel::Idle => Self::IDLE,
        }
    }
}

impl BitOr for Lanes {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        self.merge(rhs)
    }
}

impl BitOrAssign for Lanes {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.merge(rhs);
    }
}

impl fmt::Debug for Lanes {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "Lanes({:#b})", self.0)
    }
}

impl fmt::Display for Lanes {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NO_LANE => formatter.write_str("none"),
            Self::SYNC => formatter.write_str("sync"),
            Self::INPUT_CONTINUOUS => formatter.write_str("input-continuous"),
            Self::DEFAULT => formatter.write_str("default"),
            Self::IDLE => formatter.write_str("idle"),
            other => write!(formatter, "{:#b}", other.0),
        }
    }
}
