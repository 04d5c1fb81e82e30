//! Lane-tagged update queues and the skip-and-replay algorithm.
//!
//! Pending updates are appended to a queue shared by a state cell and its
//! alternate. At render time they are merged into the *current* cell's base
//! queue, so a render that is abandoned before commit leaves them in place for
//! the next attempt. Processing applies the updates whose lane is part of the
//! render lane and carries the rest (plus everything applied after the first
//! skip) into a new base queue, starting from a frozen base state.

use crate::lanes::Lanes;
use core::cell::RefCell;
use core::fmt;
use core::mem;
use std::collections::VecDeque;
use std::rc::Rc;

/// Pure transition from one state to the next.
pub type Transform<S> = Rc<dyn Fn(&S) -> S>;

/// What an update does to the state.
pub enum Action<S> {
    /// Replace the state.
    Value(S),
    /// Derive the next state from the previous one.
    Transform(Transform<S>),
}

impl<S: Clone> Clone for Action<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Value(value) => Self::Value(value.clone()),
            Self::Transform(func) => Self::Transform(Rc::clone(func)),
        }
    }
}

impl<S> fmt::Debug for Action<S> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => formatter.write_str("Value(..)"),
            Self::Transform(_) => formatter.write_str("Transform(..)"),
        }
    }
}

/// One state transition requested under `lane`.
#[derive(Debug)]
pub struct Update<S> {
    pub action: Action<S>,
    pub lane: Lanes,
}

impl<S: Clone> Clone for Update<S> {
    fn clone(&self) -> Self {
        Self {
            action: self.action.clone(),
            lane: self.lane,
        }
    }
}

impl<S> Update<S> {
    #[inline]
    pub const fn new(action: Action<S>, lane: Lanes) -> Self {
        Self { action, lane }
    }
}

impl<S: Clone> Update<S> {
    /// Apply this update to `state`.
    #[inline]
    pub fn apply(&self, state: &S) -> S {
        match &self.action {
            Action::Value(value) => value.clone(),
            Action::Transform(func) => func(state),
        }
    }
}

/// Ordered run of updates: O(1) append at the newest end, oldest-first traversal.
#[derive(Debug)]
pub struct UpdateRing<S> {
    updates: VecDeque<Update<S>>,
}

impl<S> Default for UpdateRing<S> {
    fn default() -> Self {
        Self {
            updates: VecDeque::new(),
        }
    }
}

impl<S: Clone> Clone for UpdateRing<S> {
    fn clone(&self) -> Self {
        Self {
            updates: self.updates.clone(),
        }
    }
}

impl<S> UpdateRing<S> {
    /// An empty ring.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Splice `update` in as the newest entry.
    #[inline]
    pub fn enqueue(&mut self, update: Update<S>) {
        self.updates.push_back(update);
    }

    /// Move every update of `other` behind the existing ones.
    #[inline]
    pub fn append(&mut self, mut other: Self) {
        self.updates.append(&mut other.updates);
    }

    /// Most recently inserted update.
    #[inline]
    pub fn last(&self) -> Option<&Update<S>> {
        self.updates.back()
    }

    /// Oldest-first iteration.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Update<S>> {
        self.updates.iter()
    }

    /// Number of queued updates.
    #[inline]
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Union of the lanes of every update.
    pub fn lanes(&self) -> Lanes {
        self.updates
            .iter()
            .fold(Lanes::NO_LANE, |lanes, update| lanes.merge(update.lane))
    }
}

/// Pending updates written by setters between renders.
#[derive(Debug)]
pub struct UpdateQueue<S> {
    pending: UpdateRing<S>,
}

impl<S> Default for UpdateQueue<S> {
    fn default() -> Self {
        Self {
            pending: UpdateRing::new(),
        }
    }
}

impl<S> UpdateQueue<S> {
    #[inline]
    pub fn enqueue(&mut self, update: Update<S>) {
        self.pending.enqueue(update);
    }

    /// Detach everything written since the last render.
    #[inline]
    pub fn take_pending(&mut self) -> UpdateRing<S> {
        mem::take(&mut self.pending)
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Queue handle shared by a state cell, its alternate, and its setters.
pub type SharedQueue<S> = Rc<RefCell<UpdateQueue<S>>>;

/// Create an empty shared queue.
pub fn create_update_queue<S>() -> SharedQueue<S> {
    Rc::new(RefCell::new(UpdateQueue::default()))
}

/// Result of one [`process_update_queue`] pass.
#[derive(Debug)]
pub struct ProcessedQueue<S> {
    /// Value after applying every update selected by the render lane.
    pub memoized_state: S,
    /// Checkpoint the carried queue must be replayed from.
    pub base_state: S,
    /// Updates that still need to be replayed by a later render.
    pub base_queue: UpdateRing<S>,
}

/// Fold `queue` onto `base_state`, applying only updates whose lane is inside `render_lane`.
///
/// Skipped updates are carried with their lane intact. The first skip freezes
/// the returned base state; every later applied update is carried too, with
/// [`Lanes::NO_LANE`] so it always re-applies, which keeps the replay in the
/// original order.
pub fn process_update_queue<S: Clone>(
    base_state: S,
    queue: &UpdateRing<S>,
    render_lane: Lanes,
) -> ProcessedQueue<S> {
    let mut new_state = base_state;
    let mut new_base_state: Option<S> = None;
    let mut carried = UpdateRing::new();

    for update in queue.iter() {
        if update.lane.is_subset_of(render_lane) {
            if !carried.is_empty() {
                carried.enqueue(Update::new(update.action.clone(), Lanes::NO_LANE));
            }
            new_state = update.apply(&new_state);
        } else {
            if carried.is_empty() {
                new_base_state = Some(new_state.clone());
            }
            carried.enqueue(update.clone());
        }
    }

    let base_state = new_base_state.unwrap_or_else(|| new_state.clone());
    ProcessedQueue {
        memoized_state: new_state,
        base_state,
        base_queue: carried,
    }
}

/// One piece of replayable state: the rendered value plus its carry-over.
#[derive(Debug)]
pub struct StateCell<S> {
    pub memoized_state: S,
    pub base_state: S,
    pub base_queue: UpdateRing<S>,
    pub queue: SharedQueue<S>,
}

impl<S: Clone> Clone for StateCell<S> {
    fn clone(&self) -> Self {
        Self {
            memoized_state: self.memoized_state.clone(),
            base_state: self.base_state.clone(),
            base_queue: self.base_queue.clone(),
            queue: Rc::clone(&self.queue),
        }
    }
}

impl<S: Clone> StateCell<S> {
    /// Fresh cell holding `initial` with an empty queue.
    pub fn new(initial: S) -> Self {
        Self {
            memoized_state: initial.clone(),
            base_state: initial,
            base_queue: UpdateRing::new(),
            queue: create_update_queue(),
        }
    }

    /// Produce the work-in-progress cell for a render at `render_lane`.
    ///
    /// `self` is the committed cell. Pending updates are moved into its base
    /// queue before processing, so discarding the returned cell loses nothing.
    pub fn render(&mut self, render_lane: Lanes) -> Self {
        let pending = self.queue.borrow_mut().take_pending();
        if !pending.is_empty() {
            self.base_queue.append(pending);
        }
        let processed = process_update_queue(self.base_state.clone(), &self.base_queue, render_lane);
        Self {
            memoized_state: processed.memoized_state,
            base_state: processed.base_state,
            base_queue: processed.base_queue,
            queue: Rc::clone(&self.queue),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(amount: i64) -> Action<i64> {
        let transform: Transform<i64> = Rc::new(move |state: &i64| state + amount);
        Action::Transform(transform)
    }

    fn times(factor: i64) -> Action<i64> {
        let transform: Transform<i64> = Rc::new(move |state: &i64| state * factor);
        Action::Transform(transform)
    }

    fn ring(updates: Vec<Update<i64>>) -> UpdateRing<i64> {
        let mut ring = UpdateRing::new();
        for update in updates {
            ring.enqueue(update);
        }
        ring
    }

    #[test]
    fn all_lanes_selected_is_a_left_fold() {
        let queue = ring(vec![
            Update::new(add(1), Lanes::SYNC),
            Update::new(times(10), Lanes::SYNC),
            Update::new(Action::Value(3), Lanes::SYNC),
            Update::new(add(4), Lanes::SYNC),
        ]);
        let processed = process_update_queue(0, &queue, Lanes::SYNC);
        assert_eq!(processed.memoized_state, 7);
        assert_eq!(processed.base_state, 7);
        assert!(processed.base_queue.is_empty());
    }

    #[test]
    fn skipped_updates_replay_in_original_order() {
        // +1 (sync), *10 (default), +2 (sync)
        let queue = ring(vec![
            Update::new(add(1), Lanes::SYNC),
            Update::new(times(10), Lanes::DEFAULT),
            Update::new(add(2), Lanes::SYNC),
        ]);

        let first = process_update_queue(1, &queue, Lanes::SYNC);
        assert_eq!(first.memoized_state, 4);
        assert_eq!(first.base_state, 2);
        let carried: Vec<Lanes> = first.base_queue.iter().map(|update| update.lane).collect();
        assert_eq!(carried, [Lanes::DEFAULT, Lanes::NO_LANE]);

        // The replay reaches the same value as running everything in order.
        let second = process_update_queue(first.base_state, &first.base_queue, Lanes::DEFAULT);
        let in_order = process_update_queue(1, &queue, Lanes::SYNC | Lanes::DEFAULT);
        assert_eq!(second.memoized_state, 22);
        assert_eq!(second.memoized_state, in_order.memoized_state);
        assert!(second.base_queue.is_empty());
    }

    #[test]
    fn abandoned_render_keeps_updates_on_the_committed_cell() {
        let mut current = StateCell::new(0i64);
        current.queue.borrow_mut().enqueue(Update::new(add(5), Lanes::DEFAULT));
        current.queue.borrow_mut().enqueue(Update::new(add(1), Lanes::SYNC));

        // First attempt is thrown away.
        let abandoned = current.render(Lanes::DEFAULT);
        assert_eq!(abandoned.memoized_state, 5);
        assert!(!current.queue.borrow().has_pending());
        assert_eq!(current.base_queue.len(), 2);

        // A restart sees the same updates.
        let sync = current.render(Lanes::SYNC);
        assert_eq!(sync.memoized_state, 1);
        assert_eq!(sync.base_state, 0);
        assert_eq!(sync.base_queue.lanes(), Lanes::DEFAULT);

        let mut committed = sync;
        let later = committed.render(Lanes::DEFAULT);
        assert_eq!(later.memoized_state, 6);
        assert!(later.base_queue.is_empty());
    }
}
