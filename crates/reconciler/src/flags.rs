//! Effect flags carried by work nodes and hook effects.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

/// Per-node markers consumed by the commit pipeline.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EffectFlags(u32);

impl EffectFlags {
    /// No pending work.
    pub const NONE: Self = Self(0);
    /// Insert or move the node's host subtree.
    pub const PLACEMENT: Self = Self(1 << 1);
    /// Host content or attributes changed.
    pub const UPDATE: Self = Self(1 << 2);
    /// `deletions` holds children to remove.
    pub const CHILD_DELETION: Self = Self(1 << 4);
    /// A passive effect needs to run after commit.
    pub const PASSIVE: Self = Self(1 << 3);

    /// Flags that require the mutation pass.
    pub const MUTATION_MASK: Self = Self(Self::PLACEMENT.0 | Self::UPDATE.0 | Self::CHILD_DELETION.0);
    /// Flags that require a passive-effect flush. Deletions may unmount effects.
    pub const PASSIVE_MASK: Self = Self(Self::PASSIVE.0 | Self::CHILD_DELETION.0);

    /// Combine two flag sets.
    #[inline]
    pub const fn or(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Check if all flags in `other` are present.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Check if any flag in `other` is present.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    #[inline]
    pub const fn remove(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EffectFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

impl BitOrAssign for EffectFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.or(rhs);
    }
}

impl fmt::Debug for EffectFlags {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(EffectFlags, &str); 4] = [
            (EffectFlags::PLACEMENT, "Placement"),
            (EffectFlags::UPDATE, "Update"),
            (EffectFlags::PASSIVE, "Passive"),
            (EffectFlags::CHILD_DELETION, "ChildDeletion"),
        ];
        if self.is_empty() {
            return formatter.write_str("NoFlags");
        }
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    formatter.write_str(" | ")?;
                }
                formatter.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Tags on a hook effect.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct HookFlags(u8);

impl HookFlags {
    pub const NONE: Self = Self(0);
    /// Dependencies changed (or first mount): teardown and setup must run.
    pub const HAS_EFFECT: Self = Self(1 << 0);
    /// Deferred until after commit.
    pub const PASSIVE: Self = Self(1 << 3);

    #[inline]
    pub const fn or(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl BitOr for HookFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_cover_expected_flags() {
        assert!(EffectFlags::MUTATION_MASK.contains(EffectFlags::PLACEMENT | EffectFlags::UPDATE));
        assert!(!EffectFlags::MUTATION_MASK.intersects(EffectFlags::PASSIVE));
        assert!(EffectFlags::PASSIVE_MASK.intersects(EffectFlags::CHILD_DELETION));
        let flags = EffectFlags::PLACEMENT | EffectFlags::PASSIVE;
        assert_eq!(flags.remove(EffectFlags::PLACEMENT), EffectFlags::PASSIVE);
        assert_eq!(format!("{flags:?}"), "Placement | Passive");
    }
}
