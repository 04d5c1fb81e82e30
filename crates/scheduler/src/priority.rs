//! Scheduler priority levels and their timeout ladder.

use crate::clock::{Timestamp, millis};
use core::fmt;

/// Timeout for immediate work: negative, so the task is expired on arrival.
const IMMEDIATE_PRIORITY_TIMEOUT: Timestamp = -1;
const USER_BLOCKING_PRIORITY_TIMEOUT: Timestamp = millis(250);
const NORMAL_PRIORITY_TIMEOUT: Timestamp = millis(5_000);
const LOW_PRIORITY_TIMEOUT: Timestamp = millis(10_000);
/// 2^30 - 1 milliseconds; idle work never expires in practice.
const IDLE_PRIORITY_TIMEOUT: Timestamp = millis(1_073_741_823);

/// Urgency class of a scheduled task. Lower discriminants are more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum PriorityLevel {
    /// Must run now; treated as already expired.
    Immediate = 1,
    /// Direct user interaction (typing, hovering).
    UserBlocking = 2,
    /// Default priority for ordinary updates.
    #[default]
    Normal = 3,
    /// Work that can wait noticeably longer.
    Low = 4,
    /// Only when nothing else is pending.
    Idle = 5,
}

impl PriorityLevel {
    /// All levels from most to least urgent.
    pub const ALL: [Self; 5] = [
        Self::Immediate,
        Self::UserBlocking,
        Self::Normal,
        Self::Low,
        Self::Idle,
    ];

    /// Time after which a task at this level is considered starved.
    #[inline]
    pub const fn timeout(self) -> Timestamp {
        match self {
            Self::Immediate => IMMEDIATE_PRIORITY_TIMEOUT,
            Self::UserBlocking => USER_BLOCKING_PRIORITY_TIMEOUT,
            Self::Normal => NORMAL_PRIORITY_TIMEOUT,
            Self::Low => LOW_PRIORITY_TIMEOUT,
            Self::Idle => IDLE_PRIORITY_TIMEOUT,
        }
    }

    /// Short lowercase name for logs.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::UserBlocking => "user-blocking",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_grow_with_decreasing_urgency() {
        let timeouts: Vec<Timestamp> = PriorityLevel::ALL.iter().map(|level| level.timeout()).collect();
        assert!(timeouts.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(PriorityLevel::Immediate.timeout() < 0);
        assert_eq!(PriorityLevel::UserBlocking.timeout(), 250_000);
    }
}
