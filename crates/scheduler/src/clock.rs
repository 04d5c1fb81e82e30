//! Time sources for the scheduler.
//!
//! All scheduler arithmetic happens on signed microsecond timestamps measured
//! from the clock's origin. Signed values let the immediate-priority timeout
//! produce an expiration that is already in the past.

use core::cell::Cell;
use core::time::Duration;
use std::rc::Rc;
use std::thread;
use std::time::Instant;

/// Microseconds since the clock origin.
pub type Timestamp = i64;

/// Convert whole milliseconds into a [`Timestamp`] span.
#[inline]
pub const fn millis(value: i64) -> Timestamp {
    value * 1_000
}

/// A monotonic time source.
pub trait Clock {
    /// Current time.
    fn now(&self) -> Timestamp;

    /// Block (or jump) until `deadline` has been reached.
    fn sleep_until(&self, deadline: Timestamp);
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is "now".
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.origin.elapsed().as_micros();
        Timestamp::try_from(elapsed).unwrap_or(Timestamp::MAX)
    }

    fn sleep_until(&self, deadline: Timestamp) {
        let remaining = deadline.saturating_sub(self.now());
        if remaining > 0 {
            thread::sleep(Duration::from_micros(remaining as u64));
        }
    }
}

/// Manually advanced clock for deterministic tests and simulations.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Timestamp>>,
}

impl ManualClock {
    /// Create a clock starting at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `span` microseconds.
    #[inline]
    pub fn advance(&self, span: Timestamp) {
        self.now.set(self.now.get().saturating_add(span.max(0)));
    }

    /// Move time forward by whole milliseconds.
    #[inline]
    pub fn advance_ms(&self, span: i64) {
        self.advance(millis(span));
    }

    /// Set the absolute time. Going backwards is ignored.
    #[inline]
    pub fn set(&self, at: Timestamp) {
        if at > self.now.get() {
            self.now.set(at);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }

    fn sleep_until(&self, deadline: Timestamp) {
        self.set(deadline);
    }
}
