//! Commit pipeline: apply a finished tree to the host, then flush passive
//! effects from a separate scheduler task.

use crate::engine::{CommitStats, Engine};
use crate::error::ReconcileError;
use crate::fiber::{FiberId, StateNode, WorkTag};
use crate::flags::{EffectFlags, HookFlags};
use crate::hooks::{Effect, effects};
use crate::host_config::HostConfig;
use crate::lanes::Lanes;
use crate::root::RootId;
use anyhow::{Result, anyhow};
use core::mem;
use log::{debug, trace};
use scheduler::{Callback, PriorityLevel};
use std::rc::Rc;

impl<H: HostConfig + 'static> Engine<H> {
    /// Commit the root's finished tree, if any.
    pub(crate) fn commit_root(&mut self, root_id: RootId) -> Result<()> {
        let root = self.root_mut(root_id)?;
        let Some(finished) = root.finished_work.take() else {
            return Ok(());
        };
        let lane = mem::replace(&mut root.finished_lane, Lanes::NO_LANE);
        root.mark_finished(lane);
        root.reset_callback();

        let node = self.fibers.node(finished)?;
        let all_flags = node.flags | node.subtree_flags;
        if all_flags.intersects(EffectFlags::PASSIVE_MASK) {
            let pending = self.root_mut(root_id)?;
            if !pending.passive_effects_scheduled {
                pending.passive_effects_scheduled = true;
                let task = self.scheduler.schedule_callback(
                    PriorityLevel::Normal,
                    Callback::new(move |engine: &mut Self, _| {
                        engine.flush_passive_effects(root_id)?;
                        Ok(None)
                    }),
                );
                trace!("{root_id}: passive effects flush scheduled as {task}");
            }
        }

        let mut stats = CommitStats {
            root: root_id,
            lane,
            placements: 0,
            updates: 0,
            deletions: 0,
        };
        if all_flags.intersects(EffectFlags::MUTATION_MASK.or(EffectFlags::PASSIVE_MASK)) {
            self.commit_mutation_effects(root_id, finished, &mut stats)?;
        }

        self.root_mut(root_id)?.current = finished;
        self.host.reset_after_commit();
        self.commit_count += 1;
        self.last_commit = Some(stats);
        debug!(
            "committed {root_id} at lane {lane}: {} placed, {} updated, {} deleted",
            stats.placements, stats.updates, stats.deletions
        );

        self.collect_garbage();
        self.ensure_root_is_scheduled(root_id)
    }

    /// Depth-first pass over the finished tree, entering only subtrees whose
    /// aggregate flags call for work.
    fn commit_mutation_effects(&mut self, root_id: RootId, finished: FiberId, stats: &mut CommitStats) -> Result<()> {
        let relevant = EffectFlags::MUTATION_MASK.or(EffectFlags::PASSIVE_MASK);
        let mut stack = vec![finished];
        while let Some(id) = stack.pop() {
            let node = self.fibers.node(id)?;
            let flags = node.flags;
            if node.subtree_flags.intersects(relevant) {
                let children: Vec<FiberId> = self.fibers.siblings(node.child).collect();
                stack.extend(children.into_iter().rev());
            }
            if !flags.is_empty() {
                self.commit_mutation_on_fiber(root_id, id, flags, stats)?;
            }
        }
        Ok(())
    }

    fn commit_mutation_on_fiber(
        &mut self,
        root_id: RootId,
        fiber: FiberId,
        flags: EffectFlags,
        stats: &mut CommitStats,
    ) -> Result<()> {
        if flags.contains(EffectFlags::PLACEMENT) {
            self.commit_placement(root_id, fiber)?;
            stats.placements += 1;
        }
        if flags.contains(EffectFlags::UPDATE) {
            self.commit_update(fiber)?;
            stats.updates += 1;
        }
        if flags.contains(EffectFlags::CHILD_DELETION) {
            let deletions = mem::take(&mut self.fibers.node_mut(fiber)?.deletions);
            for deleted in deletions {
                self.commit_deletion(root_id, fiber, deleted)?;
                stats.deletions += 1;
            }
        }
        if flags.contains(EffectFlags::PASSIVE) {
            let queued: Vec<Rc<Effect>> = effects(&self.fibers.node(fiber)?.hooks).cloned().collect();
            self.root_mut(root_id)?
                .pending_passive_effects
                .update
                .extend(queued);
        }

        let node = self.fibers.node_mut(fiber)?;
        node.flags = EffectFlags::NONE;
        Ok(())
    }

    /// Host instance of the nearest host ancestor of `start`, inclusive.
    fn nearest_host_parent(&self, root_id: RootId, start: Option<FiberId>) -> Result<H::Instance> {
        let mut cursor = start;
        while let Some(id) = cursor {
            let node = self.fibers.node(id)?;
            match (&node.tag, &node.state_node) {
                (WorkTag::HostComponent, StateNode::Instance(instance)) => return Ok(instance.clone()),
                (WorkTag::HostRoot, StateNode::Root(root)) => {
                    return Ok(self.root(*root)?.container.clone());
                }
                _ => cursor = node.parent,
            }
        }
        Err(ReconcileError::MissingHostParent(start.unwrap_or(self.root(root_id)?.current)).into())
    }

    /// Nearest following host node that is already in place.
    ///
    /// Walks forward through siblings (and up through non-host parents),
    /// descending into non-host nodes, and skips anything that is itself
    /// being placed in this commit.
    fn get_host_sibling(&self, fiber: FiberId) -> Result<Option<H::Instance>> {
        let mut cursor = fiber;
        'siblings: loop {
            let sibling = loop {
                let node = self.fibers.node(cursor)?;
                if let Some(sibling) = node.sibling {
                    break sibling;
                }
                let Some(parent) = node.parent else {
                    return Ok(None);
                };
                let parent_tag = self.fibers.node(parent)?.tag;
                if matches!(parent_tag, WorkTag::HostComponent | WorkTag::HostRoot) {
                    return Ok(None);
                }
                cursor = parent;
            };
            cursor = sibling;

            loop {
                let node = self.fibers.node(cursor)?;
                if node.tag.is_host() {
                    break;
                }
                if node.flags.contains(EffectFlags::PLACEMENT) {
                    continue 'siblings;
                }
                match node.child {
                    Some(child) => cursor = child,
                    None => continue 'siblings,
                }
            }

            let node = self.fibers.node(cursor)?;
            if !node.flags.contains(EffectFlags::PLACEMENT) {
                return Ok(node.state_node.instance().cloned());
            }
        }
    }

    fn commit_placement(&mut self, root_id: RootId, fiber: FiberId) -> Result<()> {
        let start = self.fibers.node(fiber)?.parent;
        let parent = self.nearest_host_parent(root_id, start)?;
        let before = self.get_host_sibling(fiber)?;
        trace!("placing {fiber} (before: {before:?})");
        self.insert_or_append_placement_node(fiber, &parent, before.as_ref())
    }

    /// Insert the topmost host nodes of `fiber`'s subtree.
    fn insert_or_append_placement_node(
        &mut self,
        fiber: FiberId,
        parent: &H::Instance,
        before: Option<&H::Instance>,
    ) -> Result<()> {
        let node = self.fibers.node(fiber)?;
        if node.tag.is_host() {
            let Some(instance) = node.state_node.instance() else {
                return Err(anyhow!("{fiber} was placed without a host instance"));
            };
            return match before {
                Some(before) => self.host.insert_before(parent, instance, before),
                None => self.host.append_child(parent, instance),
            };
        }
        let children: Vec<FiberId> = self.fibers.siblings(node.child).collect();
        for child in children {
            self.insert_or_append_placement_node(child, parent, before)?;
        }
        Ok(())
    }

    fn commit_update(&mut self, fiber: FiberId) -> Result<()> {
        let node = self.fibers.node(fiber)?;
        let (Some(instance), Some(current)) = (node.state_node.instance(), node.alternate) else {
            return Ok(());
        };
        let old = &self.fibers.node(current)?.memoized_props;
        match node.tag {
            WorkTag::HostText => self.host.commit_text_update(
                instance,
                old.text().unwrap_or_default(),
                node.memoized_props.text().unwrap_or_default(),
            ),
            WorkTag::HostComponent => match (old.props(), node.memoized_props.props()) {
                (Some(old_props), Some(new_props)) => self.host.commit_update(instance, old_props, new_props),
                _ => Ok(()),
            },
            WorkTag::HostRoot | WorkTag::FunctionComponent | WorkTag::Fragment => Ok(()),
        }
    }

    /// Remove a deleted subtree from the host and queue its effect teardowns.
    ///
    /// Only the topmost host nodes are removed; their descendants go with them.
    fn commit_deletion(&mut self, root_id: RootId, parent_fiber: FiberId, deleted: FiberId) -> Result<()> {
        let host_parent = self.nearest_host_parent(root_id, Some(parent_fiber))?;
        let mut unmounted: Vec<Rc<Effect>> = Vec::new();
        let mut stack = vec![(deleted, false)];
        while let Some((id, under_host)) = stack.pop() {
            let node = self.fibers.node(id)?;
            match node.tag {
                WorkTag::HostComponent | WorkTag::HostText if !under_host => {
                    if let Some(instance) = node.state_node.instance() {
                        self.host.remove_child(&host_parent, instance)?;
                    }
                }
                WorkTag::FunctionComponent => unmounted.extend(effects(&node.hooks).cloned()),
                WorkTag::HostComponent | WorkTag::HostText | WorkTag::HostRoot | WorkTag::Fragment => {}
            }
            let nested = under_host || node.tag.is_host();
            let children: Vec<FiberId> = self.fibers.siblings(node.child).collect();
            stack.extend(children.into_iter().rev().map(|child| (child, nested)));
        }

        let alternate = self.fibers.node(deleted)?.alternate;
        self.fibers.node_mut(deleted)?.parent = None;
        if let Some(node) = alternate.and_then(|id| self.fibers.get_mut(id)) {
            node.parent = None;
        }
        self.root_mut(root_id)?
            .pending_passive_effects
            .unmount
            .extend(unmounted);
        trace!("deleted {deleted}");
        Ok(())
    }

    /// Run queued passive effects of `root_id`: every teardown of unmounted
    /// nodes, then every changed effect's teardown, then every setup.
    ///
    /// Returns whether anything ran.
    pub(crate) fn flush_passive_effects(&mut self, root_id: RootId) -> Result<bool> {
        let root = self.root_mut(root_id)?;
        root.passive_effects_scheduled = false;
        let pending = mem::take(&mut root.pending_passive_effects);
        if pending.is_empty() {
            return Ok(false);
        }

        for effect in &pending.unmount {
            effect.run_destroy();
        }
        let changed = HookFlags::PASSIVE | HookFlags::HAS_EFFECT;
        for effect in pending.update.iter().filter(|effect| effect.tag().contains(changed)) {
            effect.run_destroy();
        }
        for effect in pending.update.iter().filter(|effect| effect.tag().contains(changed)) {
            effect.run_create();
        }
        debug!(
            "{root_id}: flushed {} unmount and {} update effects",
            pending.unmount.len(),
            pending.update.len()
        );

        // Effects may have set state.
        self.process_update_requests()?;
        self.flush_sync_callbacks()?;
        Ok(true)
    }
}
