//! Host turn driver.
//!
//! These functions stand in for the event loop a scheduler normally relies on:
//! a "perform work" message that flushes one slice, and a timer that migrates
//! delayed tasks once they are due. Each call runs at most one host turn.

use crate::work_loop::{Schedule, flush_work};
use anyhow::Result;
use log::trace;

/// Handle one "perform work" message: flush a single slice.
///
/// The message loop is disarmed once no ready work remains. If a callback
/// fails, the loop stays armed so the remaining tasks run on a later turn.
pub fn perform_work_until_deadline<C: Schedule>(ctx: &mut C) -> Result<()> {
    let scheduler = ctx.scheduler();
    if !scheduler.is_message_loop_running() {
        return Ok(());
    }
    let start_time = scheduler.now();
    scheduler.begin_slice(start_time);

    let has_more_work = flush_work(ctx, true, start_time)?;
    if !has_more_work {
        trace!("message loop drained");
        ctx.scheduler().stop_message_loop();
    }
    Ok(())
}

/// Handle the host timer firing.
pub fn handle_timeout<C: Schedule>(ctx: &mut C) {
    let scheduler = ctx.scheduler();
    let current_time = scheduler.now();
    scheduler.on_host_timeout(current_time);
}

/// Run one macrotask if any is due.
///
/// Returns `Ok(false)` when nothing could run right now; the caller may then
/// sleep until [`crate::Scheduler::next_timer_deadline`].
pub fn run_next_macrotask<C: Schedule>(ctx: &mut C) -> Result<bool> {
    let scheduler = ctx.scheduler();
    if scheduler.is_message_loop_running() {
        perform_work_until_deadline(ctx)?;
        return Ok(true);
    }
    let now = scheduler.now();
    match scheduler.next_timer_deadline() {
        Some(deadline) if deadline <= now => {
            handle_timeout(ctx);
            Ok(true)
        }
        _ => Ok(false),
    }
}
