//! The task scheduler: two heaps, a slot table of callbacks, and the flush loop.

use crate::clock::{Clock, Timestamp, millis};
use crate::heap::PriorityHeap;
use crate::priority::PriorityLevel;
use crate::task::{Callback, Slot, Task, TaskHandle};
use anyhow::Result;
use core::fmt;
use core::mem;
use log::{debug, trace, warn};
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Default length of one time slice before `should_yield` turns true.
pub const DEFAULT_FRAME_INTERVAL: Timestamp = millis(5);

/// Access to the [`Scheduler`] embedded in a context.
///
/// Callbacks receive the whole context mutably, so the scheduler cannot own
/// it; instead the context owns the scheduler and exposes it through this trait.
pub trait Schedule: Sized {
    /// The scheduler driving this context.
    fn scheduler(&mut self) -> &mut Scheduler<Self>;
}

/// Cooperative, time-sliced task scheduler over a context `C`.
///
/// The scheduler never drives itself. It records what it would ask of a host
/// event loop (a "perform work" message and an optional timer deadline) and the
/// functions in [`crate::host`] play the host's part, one turn at a time.
pub struct Scheduler<C> {
    clock: Rc<dyn Clock>,
    /// Ready tasks keyed by expiration time.
    task_queue: PriorityHeap<Task>,
    /// Delayed tasks keyed by start time.
    timer_queue: PriorityHeap<Task>,
    /// Callbacks of live tasks. Missing entry means cancelled or finished.
    slots: FxHashMap<u64, Slot<C>>,
    task_id_counter: u64,
    is_performing_work: bool,
    is_host_callback_scheduled: bool,
    message_loop_running: bool,
    host_timeout: Option<Timestamp>,
    /// Start of the current slice.
    start_time: Timestamp,
    frame_interval: Timestamp,
    current_priority: PriorityLevel,
    current_task: Option<TaskHandle>,
}

impl<C> fmt::Debug for Scheduler<C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Scheduler")
            .field("ready", &self.task_queue.len())
            .field("timers", &self.timer_queue.len())
            .field("live", &self.slots.len())
            .field("performing", &self.is_performing_work)
            .field("message_loop", &self.message_loop_running)
            .field("host_timeout", &self.host_timeout)
            .field("priority", &self.current_priority)
            .finish_non_exhaustive()
    }
}

impl<C> Scheduler<C> {
    /// Create an idle scheduler reading time from `clock`.
    #[must_use]
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            task_queue: PriorityHeap::new(),
            timer_queue: PriorityHeap::new(),
            slots: FxHashMap::default(),
            task_id_counter: 0,
            is_performing_work: false,
            is_host_callback_scheduled: false,
            message_loop_running: false,
            host_timeout: None,
            start_time: -1,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            current_priority: PriorityLevel::Normal,
            current_task: None,
        }
    }

    /// Builder-style override of the slice length.
    #[must_use]
    pub fn with_frame_interval(mut self, interval: Timestamp) -> Self {
        self.set_frame_interval(interval);
        self
    }

    /// Change the slice length. Values below one microsecond are clamped.
    #[inline]
    pub fn set_frame_interval(&mut self, interval: Timestamp) {
        self.frame_interval = interval.max(1);
    }

    #[inline]
    pub const fn frame_interval(&self) -> Timestamp {
        self.frame_interval
    }

    /// Current time from the scheduler's clock.
    #[inline]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Shared handle to the clock.
    #[inline]
    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.clock)
    }

    /// Schedule `callback` to run as soon as possible at `priority`.
    pub fn schedule_callback(&mut self, priority: PriorityLevel, callback: Callback<C>) -> TaskHandle {
        self.schedule_delayed_callback(priority, callback, 0)
    }

    /// Schedule `callback` to become eligible after `delay` microseconds.
    pub fn schedule_delayed_callback(
        &mut self,
        priority: PriorityLevel,
        callback: Callback<C>,
        delay: Timestamp,
    ) -> TaskHandle {
        let current_time = self.now();
        let start_time = if delay > 0 {
            current_time.saturating_add(delay)
        } else {
            current_time
        };
        let expiration_time = start_time.saturating_add(priority.timeout());

        self.task_id_counter += 1;
        let id = self.task_id_counter;
        let mut task = Task {
            id,
            priority,
            start_time,
            expiration_time,
            sort_index: -1,
        };
        self.slots.insert(id, Slot::Ready(callback));

        if start_time > current_time {
            task.sort_index = start_time;
            self.timer_queue.push(task);
            let is_first_timer = self.timer_queue.peek().map(|timer| timer.id) == Some(id);
            if self.task_queue.is_empty() && is_first_timer {
                // Replaces whatever timeout was armed before.
                self.request_host_timeout(start_time);
            }
            debug!("scheduled {} at {priority} (delayed until {start_time})", task.handle());
        } else {
            task.sort_index = expiration_time;
            self.task_queue.push(task);
            if !self.is_performing_work && !self.is_host_callback_scheduled {
                self.is_host_callback_scheduled = true;
                self.request_host_callback();
            }
            debug!("scheduled {} at {priority}", task.handle());
        }
        task.handle()
    }

    /// Cancel a task. Its heap entry is skipped and dropped lazily.
    ///
    /// Cancelling a finished or unknown task is a no-op.
    pub fn cancel_callback(&mut self, handle: TaskHandle) {
        if self.slots.remove(&handle.0).is_some() {
            debug!("cancelled {handle}");
        }
    }

    /// Whether the task behind `handle` is still waiting or running.
    #[inline]
    pub fn is_live(&self, handle: TaskHandle) -> bool {
        self.slots.contains_key(&handle.0)
    }

    /// True once the current slice has used up its budget.
    #[inline]
    pub fn should_yield(&self) -> bool {
        self.now() - self.start_time > self.frame_interval
    }

    /// Priority of the running task, or of the innermost `run_with_priority` scope.
    #[inline]
    pub const fn current_priority_level(&self) -> PriorityLevel {
        self.current_priority
    }

    /// Task currently being executed by the flush loop.
    #[inline]
    pub const fn current_task(&self) -> Option<TaskHandle> {
        self.current_task
    }

    /// Head of the ready queue (possibly a cancelled entry not yet dropped).
    #[inline]
    pub fn first_callback_node(&self) -> Option<TaskHandle> {
        self.task_queue.peek().map(Task::handle)
    }

    /// Deadline of the armed host timer, if any.
    #[inline]
    pub const fn next_timer_deadline(&self) -> Option<Timestamp> {
        self.host_timeout
    }

    /// Whether a "perform work" message is pending on the host.
    #[inline]
    pub const fn is_message_loop_running(&self) -> bool {
        self.message_loop_running
    }

    /// Number of tasks that have neither finished nor been cancelled.
    #[inline]
    pub fn pending_task_count(&self) -> usize {
        self.slots.len()
    }

    /// Move every due timer into the ready queue, dropping cancelled ones.
    fn advance_timers(&mut self, current_time: Timestamp) {
        while let Some(timer) = self.timer_queue.peek().copied() {
            if !self.slots.contains_key(&timer.id) {
                self.timer_queue.pop();
            } else if timer.start_time <= current_time {
                self.timer_queue.pop();
                let mut ready = timer;
                ready.sort_index = ready.expiration_time;
                trace!("timer {} is due", ready.handle());
                self.task_queue.push(ready);
            } else {
                return;
            }
        }
    }

    /// Pop the ready-queue head if it is task `id`.
    fn pop_if_head(&mut self, id: u64) {
        if self.task_queue.peek().map(|task| task.id) == Some(id) {
            self.task_queue.pop();
        }
    }

    #[inline]
    fn request_host_callback(&mut self) {
        self.message_loop_running = true;
    }

    #[inline]
    fn request_host_timeout(&mut self, deadline: Timestamp) {
        self.host_timeout = Some(deadline);
    }

    #[inline]
    fn cancel_host_timeout(&mut self) {
        self.host_timeout = None;
    }

    /// Host timer fired: migrate due timers and arm whichever channel is needed next.
    pub(crate) fn on_host_timeout(&mut self, current_time: Timestamp) {
        self.cancel_host_timeout();
        self.advance_timers(current_time);

        if self.task_queue.is_empty() {
            if let Some(first_timer) = self.timer_queue.peek() {
                let deadline = first_timer.start_time;
                self.request_host_timeout(deadline);
            }
        } else if !self.is_host_callback_scheduled {
            self.is_host_callback_scheduled = true;
            self.request_host_callback();
        }
    }

    /// Start a new slice at `now`.
    pub(crate) fn begin_slice(&mut self, now: Timestamp) {
        self.start_time = now;
    }

    /// The message loop ran dry.
    pub(crate) fn stop_message_loop(&mut self) {
        self.message_loop_running = false;
    }
}

/// Run `func` with `level` as the current priority, restoring the previous level after.
pub fn run_with_priority<C, R, F>(ctx: &mut C, level: PriorityLevel, func: F) -> R
where
    C: Schedule,
    F: FnOnce(&mut C) -> R,
{
    let previous = ctx.scheduler().current_priority;
    ctx.scheduler().current_priority = level;
    let result = func(ctx);
    ctx.scheduler().current_priority = previous;
    result
}

/// Flush ready tasks until the queue drains or the slice is used up.
///
/// Returns `Ok(true)` if work remains. Scheduler bookkeeping is restored
/// before an error from a callback is returned.
pub(crate) fn flush_work<C: Schedule>(
    ctx: &mut C,
    has_time_remaining: bool,
    initial_time: Timestamp,
) -> Result<bool> {
    let scheduler = ctx.scheduler();
    scheduler.is_host_callback_scheduled = false;
    if scheduler.host_timeout.is_some() {
        scheduler.cancel_host_timeout();
    }
    let previous_priority = scheduler.current_priority;
    scheduler.is_performing_work = true;

    let result = work_loop(ctx, has_time_remaining, initial_time);

    let scheduler = ctx.scheduler();
    scheduler.current_task = None;
    scheduler.current_priority = previous_priority;
    scheduler.is_performing_work = false;
    result
}

fn work_loop<C: Schedule>(
    ctx: &mut C,
    has_time_remaining: bool,
    initial_time: Timestamp,
) -> Result<bool> {
    let mut current_time = initial_time;
    ctx.scheduler().advance_timers(current_time);

    loop {
        let scheduler = ctx.scheduler();
        let Some(task) = scheduler.task_queue.peek().copied() else {
            break;
        };
        scheduler.current_task = Some(task.handle());

        if task.expiration_time > current_time
            && (!has_time_remaining || scheduler.should_yield())
        {
            trace!("yielding before {}", task.handle());
            return Ok(true);
        }

        let Some(slot) = scheduler.slots.get_mut(&task.id) else {
            // cancelled
            scheduler.task_queue.pop();
            continue;
        };
        let Slot::Ready(callback) = mem::replace(slot, Slot::Running) else {
            warn!("{} reached the queue head while already running", task.handle());
            scheduler.task_queue.pop();
            continue;
        };

        scheduler.current_priority = task.priority;
        let did_timeout = task.expiration_time < current_time;
        trace!("running {} (timed out: {did_timeout})", task.handle());

        let outcome = callback.call(ctx, did_timeout);

        let scheduler = ctx.scheduler();
        current_time = scheduler.now();
        match outcome {
            Ok(Some(continuation)) => {
                if let Some(live) = scheduler.slots.get_mut(&task.id) {
                    *live = Slot::Ready(continuation);
                    scheduler.advance_timers(current_time);
                    trace!("{} returned a continuation", task.handle());
                    return Ok(true);
                }
                // Cancelled while running; the continuation is discarded.
                scheduler.pop_if_head(task.id);
            }
            Ok(None) => {
                scheduler.slots.remove(&task.id);
                scheduler.pop_if_head(task.id);
            }
            Err(err) => {
                scheduler.slots.remove(&task.id);
                scheduler.pop_if_head(task.id);
                scheduler.advance_timers(current_time);
                warn!("{} failed: {err}", task.handle());
                return Err(err);
            }
        }
        scheduler.advance_timers(current_time);
    }

    let scheduler = ctx.scheduler();
    if let Some(first_timer) = scheduler.timer_queue.peek() {
        let deadline = first_timer.start_time;
        scheduler.request_host_timeout(deadline);
    }
    Ok(false)
}
