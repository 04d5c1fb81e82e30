//! Root containers.

use crate::fiber::FiberId;
use crate::hooks::Effect;
use crate::lanes::Lanes;
use core::fmt;
use scheduler::TaskHandle;
use std::rc::Rc;

/// Handle returned by `Engine::mount`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct RootId(pub(crate) usize);

impl fmt::Display for RootId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "root#{}", self.0)
    }
}

/// Effects waiting for the deferred flush.
#[derive(Debug, Default)]
pub struct PendingPassiveEffects {
    /// Effects of unmounted components; only teardowns run.
    pub unmount: Vec<Rc<Effect>>,
    /// Effects of committed components; teardown then setup when flagged.
    pub update: Vec<Rc<Effect>>,
}

impl PendingPassiveEffects {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.unmount.is_empty() && self.update.is_empty()
    }
}

/// Bookkeeping for one mounted tree.
#[derive(Debug)]
pub struct FiberRoot<I> {
    /// Host container the tree renders into.
    pub container: I,
    /// Fully committed tree.
    pub current: FiberId,
    /// Completed tree awaiting commit.
    pub finished_work: Option<FiberId>,
    pub finished_lane: Lanes,
    pub pending_lanes: Lanes,
    pub pending_passive_effects: PendingPassiveEffects,
    /// A passive flush task is already scheduled.
    pub passive_effects_scheduled: bool,
    /// Scheduler task rendering this root (`None` for the sync channel).
    pub callback_node: Option<TaskHandle>,
    /// Lane `callback_node` was scheduled for.
    pub callback_priority: Lanes,
}

impl<I> FiberRoot<I> {
    pub fn new(container: I, current: FiberId) -> Self {
        Self {
            container,
            current,
            finished_work: None,
            finished_lane: Lanes::NO_LANE,
            pending_lanes: Lanes::NO_LANE,
            pending_passive_effects: PendingPassiveEffects::default(),
            passive_effects_scheduled: false,
            callback_node: None,
            callback_priority: Lanes::NO_LANE,
        }
    }

    #[inline]
    pub fn mark_updated(&mut self, lane: Lanes) {
        self.pending_lanes = self.pending_lanes.merge(lane);
    }

    #[inline]
    pub fn mark_finished(&mut self, lane: Lanes) {
        self.pending_lanes = self.pending_lanes.remove(lane);
    }

    #[inline]
    pub fn reset_callback(&mut self) {
        self.callback_node = None;
        self.callback_priority = Lanes::NO_LANE;
    }
}
