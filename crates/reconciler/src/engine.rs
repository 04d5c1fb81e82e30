//! The engine context.
//!
//! [`Engine`] owns everything the render loop, the commit pipeline and the
//! scheduler share: the work-node arena, the root containers, the task
//! scheduler, the synchronous callback queue and the in-progress cursor.
//! Nothing lives in globals; every operation takes the engine by `&mut`.
//!
//! The engine also plays the host event loop. Setters and renders only queue
//! work; [`Engine::run_microtasks`] drains the synchronous channel and
//! [`Engine::run_macrotask`] runs one scheduler turn.

use crate::config::EngineConfig;
use crate::element::Node;
use crate::error::ReconcileError;
use crate::fiber::{ElementType, FiberArena, FiberId, StateNode, WorkNode, WorkProps, WorkTag};
use crate::hooks::Shared;
use crate::host_config::HostConfig;
use crate::lanes::Lanes;
use crate::root::{FiberRoot, RootId};
use crate::update_queue::{Action, StateCell, Update};
use anyhow::Result;
use log::{debug, warn};
use scheduler::{
    Callback, Clock, PriorityLevel, Schedule, Scheduler, SystemClock, Timestamp, run_next_macrotask,
};
use std::collections::VecDeque;
use std::rc::Rc;

/// Summary of one commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitStats {
    pub root: RootId,
    pub lane: Lanes,
    /// Nodes inserted or moved.
    pub placements: usize,
    /// Host nodes whose content or attributes changed.
    pub updates: usize,
    /// Subtrees removed.
    pub deletions: usize,
}

/// Reconciler engine driving host `H`.
pub struct Engine<H: HostConfig + 'static> {
    pub(crate) host: H,
    pub(crate) fibers: FiberArena<H::Instance>,
    pub(crate) roots: Vec<FiberRoot<H::Instance>>,
    pub(crate) scheduler: Scheduler<Self>,
    /// Roots with synchronous work, flushed from a microtask.
    pub(crate) sync_queue: VecDeque<RootId>,
    pub(crate) is_flushing_sync_queue: bool,
    /// A synchronous drain is queued as a microtask.
    pub(crate) sync_flush_scheduled: bool,
    /// Next node of the suspended or running render.
    pub(crate) work_in_progress: Option<FiberId>,
    pub(crate) wip_root: Option<RootId>,
    pub(crate) wip_render_lane: Lanes,
    pub(crate) shared: Rc<Shared>,
    pub(crate) config: EngineConfig,
    pub(crate) last_commit: Option<CommitStats>,
    pub(crate) commit_count: usize,
}

impl<H: HostConfig + 'static> Schedule for Engine<H> {
    fn scheduler(&mut self) -> &mut Scheduler<Self> {
        &mut self.scheduler
    }
}

impl<H: HostConfig + 'static> Engine<H> {
    /// Engine on the wall clock.
    pub fn new(host: H, config: EngineConfig) -> Self {
        Self::with_clock(host, Rc::new(SystemClock::new()), config)
    }

    /// Engine reading time from `clock`.
    pub fn with_clock(host: H, clock: Rc<dyn Clock>, config: EngineConfig) -> Self {
        let scheduler = Scheduler::new(clock).with_frame_interval(config.frame_interval());
        Self {
            host,
            fibers: FiberArena::new(),
            roots: Vec::new(),
            scheduler,
            sync_queue: VecDeque::new(),
            is_flushing_sync_queue: false,
            sync_flush_scheduled: false,
            work_in_progress: None,
            wip_root: None,
            wip_render_lane: Lanes::NO_LANE,
            shared: Rc::new(Shared::default()),
            config,
            last_commit: None,
            commit_count: 0,
        }
    }

    /// Create a root rendering into `container`.
    pub fn mount(&mut self, container: H::Instance) -> RootId {
        let root = RootId(self.roots.len());
        let mut node = WorkNode::new(WorkTag::HostRoot, ElementType::Root, None, WorkProps::None);
        node.state_node = StateNode::Root(root);
        node.root_state = Some(StateCell::new(Node::Empty));
        let current = self.fibers.insert(node);
        self.roots.push(FiberRoot::new(container, current));
        debug!("mounted {root} with host root {current}");
        root
    }

    /// Replace the element tree of `root`.
    ///
    /// The update takes the lane of the enclosing priority scope, so outside
    /// [`Engine::run_with_priority`] it is flushed by the next
    /// [`Engine::run_microtasks`].
    ///
    /// # Errors
    /// Fails for a root handle this engine did not create.
    pub fn render(&mut self, root: RootId, node: impl Into<Node>) -> Result<()> {
        let current = self.root(root)?.current;
        let queue = self
            .fibers
            .node(current)?
            .root_state
            .as_ref()
            .map(|cell| Rc::clone(&cell.queue))
            .ok_or(ReconcileError::StaleNode(current))?;
        let lane = self.shared.request_update_lane();
        queue
            .borrow_mut()
            .enqueue(Update::new(Action::Value(node.into()), lane));
        self.schedule_update_on_fiber(current, lane)
    }

    /// Request a render of the root owning `fiber` at `lane`.
    ///
    /// Updates for nodes that are no longer mounted are dropped with a warning.
    ///
    /// # Errors
    /// Propagates failures of the scheduling decision.
    #[inline]
    pub fn schedule_update(&mut self, fiber: FiberId, lane: Lanes) -> Result<()> {
        self.schedule_update_on_fiber(fiber, lane)
    }

    /// Run `func` with `level` as the event priority.
    ///
    /// Updates requested inside take the lane mapped from `level`.
    pub fn run_with_priority<R, F>(&mut self, level: PriorityLevel, func: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        let previous = self.shared.replace_event_priority(Some(level));
        let result = scheduler::run_with_priority(self, level, func);
        self.shared.replace_event_priority(previous);
        result
    }

    /// Drain the synchronous channel: route queued state updates, then flush
    /// synchronous renders until nothing new is queued.
    ///
    /// # Errors
    /// The first failing render. Roots after it stay queued for the next drain.
    pub fn run_microtasks(&mut self) -> Result<()> {
        self.process_update_requests()?;
        while self.sync_flush_scheduled {
            self.sync_flush_scheduled = false;
            self.flush_sync_callbacks()?;
            self.process_update_requests()?;
        }
        Ok(())
    }

    /// Run one host turn: microtasks, then a scheduler slice or due timer,
    /// then microtasks again.
    ///
    /// Returns `Ok(false)` if there was no macrotask to run.
    ///
    /// # Errors
    /// Failures of the scheduled task or of the synchronous channel.
    pub fn run_macrotask(&mut self) -> Result<bool> {
        self.run_microtasks()?;
        let ran = run_next_macrotask(self)?;
        self.run_microtasks()?;
        Ok(ran)
    }

    /// Run turns until no work or timers remain, sleeping the clock to the
    /// next timer whenever nothing is ready.
    ///
    /// # Errors
    /// Stops at the first failing turn.
    pub fn run_until_idle(&mut self) -> Result<()> {
        loop {
            if self.run_macrotask()? {
                continue;
            }
            match self.scheduler.next_timer_deadline() {
                Some(deadline) => self.scheduler.clock().sleep_until(deadline),
                None => return Ok(()),
            }
        }
    }

    /// Route every state update dispatched since the last call.
    pub(crate) fn process_update_requests(&mut self) -> Result<()> {
        for request in self.shared.take_requests() {
            self.schedule_update_on_fiber(request.fiber, request.lane)?;
        }
        Ok(())
    }

    /// Queue a synchronous render of `root` behind the current turn.
    pub(crate) fn schedule_sync_callback(&mut self, root: RootId) {
        self.sync_queue.push_back(root);
        self.sync_flush_scheduled = true;
    }

    /// Run queued synchronous renders. Re-entrant calls are no-ops.
    pub(crate) fn flush_sync_callbacks(&mut self) -> Result<()> {
        if self.is_flushing_sync_queue {
            return Ok(());
        }
        self.is_flushing_sync_queue = true;
        let mut result = Ok(());
        while let Some(root) = self.sync_queue.pop_front() {
            if let Err(err) = self.perform_sync_work_on_root(root) {
                if !self.sync_queue.is_empty() {
                    self.sync_flush_scheduled = true;
                }
                result = Err(err);
                break;
            }
        }
        self.is_flushing_sync_queue = false;
        result
    }

    pub(crate) fn root(&self, root: RootId) -> Result<&FiberRoot<H::Instance>> {
        self.roots
            .get(root.0)
            .ok_or_else(|| ReconcileError::UnknownRoot(root).into())
    }

    pub(crate) fn root_mut(&mut self, root: RootId) -> Result<&mut FiberRoot<H::Instance>> {
        self.roots
            .get_mut(root.0)
            .ok_or_else(|| ReconcileError::UnknownRoot(root).into())
    }

    /// Reclaim nodes no root can reach any more.
    pub(crate) fn collect_garbage(&mut self) {
        let mut live: Vec<FiberId> = self.roots.iter().map(|root| root.current).collect();
        live.extend(self.roots.iter().filter_map(|root| root.finished_work));
        live.extend(self.work_in_progress);
        let reclaimed = self.fibers.collect_garbage(live);
        if reclaimed > 0 {
            debug!("reclaimed {reclaimed} work nodes, {} live", self.fibers.len());
        }
    }

    #[inline]
    pub const fn host(&self) -> &H {
        &self.host
    }

    #[inline]
    pub const fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    #[inline]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current time on the engine's clock.
    #[inline]
    pub fn now(&self) -> Timestamp {
        self.scheduler.now()
    }

    /// Stats of the most recent commit.
    #[inline]
    pub const fn last_commit(&self) -> Option<CommitStats> {
        self.last_commit
    }

    /// Commits performed so far, across all roots.
    #[inline]
    pub const fn commit_count(&self) -> usize {
        self.commit_count
    }

    /// Whether a render is suspended mid-tree.
    #[inline]
    pub const fn is_rendering(&self) -> bool {
        self.work_in_progress.is_some()
    }

    /// Lanes with pending updates on `root`.
    ///
    /// # Errors
    /// Fails for a root handle this engine did not create.
    pub fn pending_lanes(&self, root: RootId) -> Result<Lanes> {
        Ok(self.root(root)?.pending_lanes)
    }

    /// Live work nodes in the arena, both buffers included.
    #[inline]
    pub const fn live_node_count(&self) -> usize {
        self.fibers.len()
    }

    /// Scheduler tasks still waiting to run, cancelled ones excluded.
    #[inline]
    pub fn pending_task_count(&self) -> usize {
        self.scheduler.pending_task_count()
    }

    /// Wrap work on `root` as a scheduler callback.
    pub(crate) fn concurrent_callback(root: RootId) -> Callback<Self> {
        Callback::new(move |engine: &mut Self, did_timeout| {
            engine.perform_concurrent_work_on_root(root, did_timeout)
        })
    }

    /// Warn about and drop an update that cannot reach a root.
    pub(crate) fn drop_update(fiber: FiberId, lane: Lanes) {
        warn!("update at lane {lane} for unmounted {fiber} dropped");
    }
}
