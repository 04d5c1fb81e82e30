//! Cooperative, priority-aware task scheduler.
//!
//! Tasks are closures over a caller-owned context. Ready tasks are ordered by
//! expiration time so that urgent work runs first and starving work eventually
//! runs regardless of the frame budget; delayed tasks wait in a separate timer
//! heap. A task may hand back a continuation to split one long job into slices
//! that respect [`Scheduler::should_yield`].
//!
//! ```ignore
//! let clock = ManualClock::new();
//! let mut ctx = Ctx { scheduler: Scheduler::new(Rc::new(clock.clone())) };
//! ctx.scheduler.schedule_callback(PriorityLevel::Normal, Callback::new(|_, _| Ok(None)));
//! while host::run_next_macrotask(&mut ctx)? {}
//! ```

pub mod clock;
pub mod heap;
pub mod host;
pub mod priority;
pub mod task;
pub mod work_loop;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp, millis};
pub use heap::{HeapNode, PriorityHeap};
pub use host::{handle_timeout, perform_work_until_deadline, run_next_macrotask};
pub use priority::PriorityLevel;
pub use task::{Callback, Task, TaskHandle};
pub use work_loop::{DEFAULT_FRAME_INTERVAL, Schedule, Scheduler, run_with_priority};
