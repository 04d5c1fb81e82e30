//! Scheduled tasks, their handles, and the callback protocol.

use crate::clock::Timestamp;
use crate::heap::HeapNode;
use crate::priority::PriorityLevel;
use anyhow::Result;
use core::fmt;

/// Opaque handle returned by [`crate::Scheduler::schedule_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub(crate) u64);

impl TaskHandle {
    /// Numeric task id (monotonic per scheduler).
    #[inline]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "task#{}", self.0)
    }
}

/// Heap entry describing one scheduled task.
///
/// The callback itself lives in the scheduler's slot table keyed by `id`, so a
/// cancelled task is just an entry whose slot has disappeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task {
    /// Monotonic id, also the tie breaker inside the heaps.
    pub id: u64,
    /// Priority the task was scheduled at.
    pub priority: PriorityLevel,
    /// Earliest time the task may run.
    pub start_time: Timestamp,
    /// Time after which the task runs even over the frame budget.
    pub expiration_time: Timestamp,
    /// `start_time` while waiting in the timer heap, `expiration_time` once ready.
    pub sort_index: Timestamp,
}

impl Task {
    /// Handle for cancelling this task.
    #[inline]
    pub const fn handle(&self) -> TaskHandle {
        TaskHandle(self.id)
    }
}

impl HeapNode for Task {
    #[inline]
    fn sort_index(&self) -> i64 {
        self.sort_index
    }

    #[inline]
    fn id(&self) -> u64 {
        self.id
    }
}

type BoxedCallback<C> = Box<dyn FnOnce(&mut C, bool) -> Result<Option<Callback<C>>>>;

/// Unit of scheduled work over a context `C`.
///
/// The boolean argument reports whether the task's expiration time has already
/// passed. Returning `Ok(Some(next))` keeps the task at the head of the queue
/// with `next` as its continuation; `Ok(None)` completes it.
pub struct Callback<C>(BoxedCallback<C>);

impl<C> Callback<C> {
    /// Wrap a closure as a scheduler callback.
    #[inline]
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce(&mut C, bool) -> Result<Option<Self>> + 'static,
    {
        Self(Box::new(func))
    }

    /// Invoke the callback, consuming it.
    #[inline]
    pub fn call(self, ctx: &mut C, did_timeout: bool) -> Result<Option<Self>> {
        (self.0)(ctx, did_timeout)
    }
}

impl<C> fmt::Debug for Callback<C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("Callback(..)")
    }
}

/// Slot holding the callback of a live task.
#[derive(Debug)]
pub enum Slot<C> {
    /// Waiting to run.
    Ready(Callback<C>),
    /// Currently executing; the callback has been moved out.
    Running,
}
