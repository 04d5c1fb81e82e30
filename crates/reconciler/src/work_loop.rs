//! Scheduling decisions and the render loop.
//!
//! A root is rendered through one of two channels. The sync lane queues the
//! root on the synchronous channel, drained from a microtask so every update
//! of one turn lands in a single render. Every other lane gets a scheduler
//! task at the lane's priority; that render yields between nodes and resumes
//! from its cursor when the task continues.

use crate::engine::Engine;
use crate::error::ReconcileError;
use crate::fiber::{FiberId, StateNode, WorkProps, WorkTag};
use crate::host_config::HostConfig;
use crate::lanes::Lanes;
use crate::root::RootId;
use anyhow::Result;
use core::mem;
use log::{debug, trace, warn};
use scheduler::Callback;

/// How a render attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RootExitStatus {
    /// Yielded with work left; the cursor is kept.
    Incomplete,
    /// The whole tree completed and is ready to commit.
    Completed,
}

impl<H: HostConfig + 'static> Engine<H> {
    /// Record `lane` as pending on the root that owns `fiber` and make sure a
    /// render is scheduled for it.
    pub(crate) fn schedule_update_on_fiber(&mut self, fiber: FiberId, lane: Lanes) -> Result<()> {
        let Some(root_id) = self.find_root(fiber) else {
            Self::drop_update(fiber, lane);
            return Ok(());
        };
        self.root_mut(root_id)?.mark_updated(lane);

        // A suspended render at this lane has already read some of the queues
        // it would need; start it over.
        if self.wip_root == Some(root_id) && self.wip_render_lane.intersects(lane) {
            debug!("update at lane {lane} restarts the render of {root_id}");
            self.wip_root = None;
            self.work_in_progress = None;
            self.wip_render_lane = Lanes::NO_LANE;
        }
        self.ensure_root_is_scheduled(root_id)
    }

    /// Walk up to the host root. `None` if the node is stale or detached.
    fn find_root(&self, fiber: FiberId) -> Option<RootId> {
        let mut cursor = fiber;
        loop {
            let node = self.fibers.get(cursor)?;
            if node.tag == WorkTag::HostRoot {
                return match node.state_node {
                    StateNode::Root(root) => Some(root),
                    StateNode::None | StateNode::Instance(_) => None,
                };
            }
            cursor = node.parent?;
        }
    }

    /// Make the root's scheduled work match its most urgent pending lane.
    ///
    /// Nothing pending cancels the task. The same lane keeps the existing
    /// task. A different lane replaces it.
    pub(crate) fn ensure_root_is_scheduled(&mut self, root_id: RootId) -> Result<()> {
        let root = self
            .roots
            .get_mut(root_id.0)
            .ok_or(ReconcileError::UnknownRoot(root_id))?;
        let next_lane = root.pending_lanes.highest_priority();
        let existing = root.callback_node;

        if next_lane.is_empty() {
            if let Some(task) = existing {
                self.scheduler.cancel_callback(task);
            }
            root.reset_callback();
            return Ok(());
        }
        if next_lane == root.callback_priority {
            return Ok(());
        }
        if let Some(task) = existing {
            trace!("{root_id}: cancelling {task} for lane {next_lane}");
            self.scheduler.cancel_callback(task);
        }

        if next_lane == Lanes::SYNC {
            root.callback_node = None;
            root.callback_priority = next_lane;
            self.schedule_sync_callback(root_id);
        } else {
            let priority = next_lane.to_priority();
            let task = self
                .scheduler
                .schedule_callback(priority, Self::concurrent_callback(root_id));
            root.callback_node = Some(task);
            root.callback_priority = next_lane;
            debug!("{root_id}: scheduled {task} at {priority} for lane {next_lane}");
        }
        Ok(())
    }

    /// Scheduler entry point for non-sync lanes.
    pub(crate) fn perform_concurrent_work_on_root(
        &mut self,
        root_id: RootId,
        did_timeout: bool,
    ) -> Result<Option<Callback<Self>>> {
        let original = self.root(root_id)?.callback_node;
        if self.config.eager_passive_flush
            && self.flush_passive_effects(root_id)?
            && self.root(root_id)?.callback_node != original
        {
            // The effects scheduled different work; this task is obsolete.
            return Ok(None);
        }

        let lane = self.root(root_id)?.pending_lanes.highest_priority();
        if lane.is_empty() {
            return Ok(None);
        }
        let time_slice = lane != Lanes::SYNC && !did_timeout;
        if self.render_root(root_id, lane, time_slice)? == RootExitStatus::Completed {
            self.finish_render(root_id, lane)?;
            self.commit_root(root_id)?;
        }

        self.ensure_root_is_scheduled(root_id)?;
        let root = self.root(root_id)?;
        if original.is_some() && root.callback_node == original {
            return Ok(Some(Self::concurrent_callback(root_id)));
        }
        Ok(None)
    }

    /// Synchronous channel entry point.
    pub(crate) fn perform_sync_work_on_root(&mut self, root_id: RootId) -> Result<()> {
        if self.config.eager_passive_flush {
            self.flush_passive_effects(root_id)?;
        }
        let lane = self.root(root_id)?.pending_lanes.highest_priority();
        if lane != Lanes::SYNC {
            return self.ensure_root_is_scheduled(root_id);
        }
        self.render_root(root_id, lane, false)?;
        self.finish_render(root_id, lane)?;
        self.commit_root(root_id)
    }

    fn finish_render(&mut self, root_id: RootId, lane: Lanes) -> Result<()> {
        let current = self.root(root_id)?.current;
        let finished = self.fibers.node(current)?.alternate;
        let root = self.root_mut(root_id)?;
        root.finished_work = finished;
        root.finished_lane = lane;
        Ok(())
    }

    /// Render `root_id` at `lane`, resuming a suspended attempt at the same lane.
    ///
    /// With `time_slice` the loop yields when the scheduler asks. A failure
    /// discards the attempt; its lanes stay pending and nothing is committed.
    pub(crate) fn render_root(
        &mut self,
        root_id: RootId,
        lane: Lanes,
        time_slice: bool,
    ) -> Result<RootExitStatus> {
        if self.wip_root != Some(root_id) || self.wip_render_lane != lane {
            self.prepare_fresh_stack(root_id, lane)?;
        }

        let outcome = if time_slice {
            self.work_loop_concurrent()
        } else {
            self.work_loop_sync()
        };
        if let Err(err) = outcome {
            self.work_in_progress = None;
            self.wip_root = None;
            self.wip_render_lane = Lanes::NO_LANE;
            self.root_mut(root_id)?.reset_callback();
            warn!("render of {root_id} at lane {lane} failed: {err:#}");
            return Err(err);
        }

        if self.work_in_progress.is_some() {
            trace!("render of {root_id} yielded");
            return Ok(RootExitStatus::Incomplete);
        }
        self.wip_root = None;
        self.wip_render_lane = Lanes::NO_LANE;
        Ok(RootExitStatus::Completed)
    }

    fn prepare_fresh_stack(&mut self, root_id: RootId, lane: Lanes) -> Result<()> {
        let root = self.root_mut(root_id)?;
        root.finished_work = None;
        let current = root.current;
        let wip = self.fibers.create_work_in_progress(current, WorkProps::None)?;
        self.work_in_progress = Some(wip);
        self.wip_root = Some(root_id);
        self.wip_render_lane = lane;
        debug!("fresh stack for {root_id} at lane {lane}");
        Ok(())
    }

    fn work_loop_sync(&mut self) -> Result<()> {
        while let Some(unit) = self.work_in_progress {
            self.perform_unit_of_work(unit)?;
        }
        Ok(())
    }

    fn work_loop_concurrent(&mut self) -> Result<()> {
        while let Some(unit) = self.work_in_progress {
            if self.scheduler.should_yield() {
                break;
            }
            self.perform_unit_of_work(unit)?;
        }
        Ok(())
    }

    fn perform_unit_of_work(&mut self, unit: FiberId) -> Result<()> {
        let next = self.begin_work(unit)?;
        let node = self.fibers.node_mut(unit)?;
        node.memoized_props = mem::take(&mut node.pending_props);
        match next {
            Some(child) => self.work_in_progress = Some(child),
            None => self.complete_unit_of_work(unit)?,
        }
        Ok(())
    }

    /// Complete `unit` and its ancestors until one has a sibling left to begin.
    fn complete_unit_of_work(&mut self, unit: FiberId) -> Result<()> {
        let mut completed = unit;
        loop {
            self.complete_work(completed)?;
            let node = self.fibers.node(completed)?;
            if let Some(sibling) = node.sibling {
                self.work_in_progress = Some(sibling);
                return Ok(());
            }
            match node.parent {
                Some(parent) => completed = parent,
                None => {
                    self.work_in_progress = None;
                    return Ok(());
                }
            }
        }
    }
}
