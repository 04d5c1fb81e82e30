//! Child diffing: turns a new [`Node`] into the work-in-progress child list.
//!
//! Matching is by key (or position when unkeyed) plus element type. A reused
//! child gets a work-in-progress copy of its committed node; everything else
//! is created fresh. When tracking side effects, new or moved children are
//! flagged for placement and unmatched old children are queued on the parent
//! for deletion.

use crate::element::{Element, ElementKind, Key, Node};
use crate::fiber::{FiberArena, FiberId, WorkNode, WorkProps, WorkTag};
use crate::flags::EffectFlags;
use anyhow::Result;
use log::{trace, warn};
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Lookup key of an old child in a keyed diff.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
enum SlotKey {
    Key(Key),
    Index(usize),
}

/// Diffs the children of one node.
pub(crate) struct ChildReconciler<'arena, I> {
    fibers: &'arena mut FiberArena<I>,
    /// `false` on first mount: the whole subtree is inserted at once by its parent.
    track: bool,
}

impl<'arena, I: Clone> ChildReconciler<'arena, I> {
    pub(crate) const fn new(fibers: &'arena mut FiberArena<I>, track: bool) -> Self {
        Self { fibers, track }
    }

    /// Reconcile `new_child` against the committed children starting at `current_first`.
    ///
    /// Returns the first work-in-progress child of `parent`.
    pub(crate) fn reconcile_child_fibers(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        new_child: &Node,
    ) -> Result<Option<FiberId>> {
        // An unkeyed fragment at the top is transparent.
        let new_child = match new_child {
            Node::Element(element)
                if matches!(element.kind, ElementKind::Fragment) && element.key.is_none() =>
            {
                &element.props.children
            }
            other => other,
        };

        match new_child {
            Node::Element(element) => {
                let child = self.reconcile_single_element(parent, current_first, element)?;
                self.place_single_child(child)?;
                Ok(Some(child))
            }
            Node::Text(text) => {
                let child = self.reconcile_single_text_node(parent, current_first, text)?;
                self.place_single_child(child)?;
                Ok(Some(child))
            }
            Node::List(children) => self.reconcile_children_array(parent, current_first, children),
            Node::Empty => {
                self.delete_remaining_children(parent, current_first)?;
                Ok(None)
            }
            Node::Opaque(_) => {
                warn!("unsupported child value under {parent}, rendering nothing");
                self.delete_remaining_children(parent, current_first)?;
                Ok(None)
            }
        }
    }

    fn delete_child(&mut self, parent: FiberId, child: FiberId) -> Result<()> {
        if !self.track {
            return Ok(());
        }
        let node = self.fibers.node_mut(parent)?;
        node.deletions.push(child);
        node.flags |= EffectFlags::CHILD_DELETION;
        trace!("{parent}: deleting {child}");
        Ok(())
    }

    fn delete_remaining_children(&mut self, parent: FiberId, first: Option<FiberId>) -> Result<()> {
        if !self.track {
            return Ok(());
        }
        let doomed: Vec<FiberId> = self.fibers.siblings(first).collect();
        for child in doomed {
            self.delete_child(parent, child)?;
        }
        Ok(())
    }

    /// Work-in-progress copy of `current` as a lone child.
    fn use_fiber(&mut self, current: FiberId, pending_props: WorkProps) -> Result<FiberId> {
        let wip = self.fibers.create_work_in_progress(current, pending_props)?;
        let node = self.fibers.node_mut(wip)?;
        node.index = 0;
        node.sibling = None;
        Ok(wip)
    }

    fn attach(&mut self, parent: FiberId, child: FiberId) -> Result<FiberId> {
        self.fibers.node_mut(child)?.parent = Some(parent);
        Ok(child)
    }

    fn reconcile_single_element(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        element: &Element,
    ) -> Result<FiberId> {
        let mut child = current_first;
        while let Some(current) = child {
            let node = self.fibers.node(current)?;
            let next = node.sibling;
            if node.key == element.key {
                if node.element_type.matches(&element.kind) {
                    self.delete_remaining_children(parent, next)?;
                    let existing = self.use_fiber(current, WorkProps::from_element(element))?;
                    return self.attach(parent, existing);
                }
                // Same key, different type: nothing after it can match either.
                self.delete_remaining_children(parent, Some(current))?;
                break;
            }
            self.delete_child(parent, current)?;
            child = next;
        }

        let created = self.fibers.insert(WorkNode::from_element(element));
        self.attach(parent, created)
    }

    fn reconcile_single_text_node(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        text: &Rc<str>,
    ) -> Result<FiberId> {
        if let Some(current) = current_first {
            let node = self.fibers.node(current)?;
            if node.tag == WorkTag::HostText {
                let next = node.sibling;
                self.delete_remaining_children(parent, next)?;
                let existing = self.use_fiber(current, WorkProps::Text(Rc::clone(text)))?;
                return self.attach(parent, existing);
            }
        }
        self.delete_remaining_children(parent, current_first)?;
        let created = self.fibers.insert(WorkNode::from_text(Rc::clone(text)));
        self.attach(parent, created)
    }

    fn place_single_child(&mut self, child: FiberId) -> Result<()> {
        let node = self.fibers.node_mut(child)?;
        if self.track && node.alternate.is_none() {
            node.flags |= EffectFlags::PLACEMENT;
        }
        Ok(())
    }

    /// Flag `child` for placement if it is new or moved left of an already
    /// placed old child; otherwise advance the watermark to its old index.
    fn place_child(&mut self, child: FiberId, last_placed_index: usize) -> Result<usize> {
        if !self.track {
            return Ok(last_placed_index);
        }
        let old_index = match self.fibers.node(child)?.alternate {
            Some(current) => Some(self.fibers.node(current)?.index),
            None => None,
        };
        match old_index {
            Some(old_index) if old_index >= last_placed_index => Ok(old_index),
            Some(_) | None => {
                self.fibers.node_mut(child)?.flags |= EffectFlags::PLACEMENT;
                Ok(last_placed_index)
            }
        }
    }

    fn reconcile_children_array(
        &mut self,
        parent: FiberId,
        current_first: Option<FiberId>,
        children: &[Node],
    ) -> Result<Option<FiberId>> {
        let mut existing: FxHashMap<SlotKey, FiberId> = FxHashMap::default();
        let mut duplicates = Vec::new();
        for id in self.fibers.siblings(current_first) {
            let node = self.fibers.node(id)?;
            let slot = node
                .key
                .clone()
                .map_or(SlotKey::Index(node.index), SlotKey::Key);
            if let Some(displaced) = existing.insert(slot.clone(), id) {
                warn!("duplicate child key {slot:?} under {parent}, dropping {displaced}");
                duplicates.push(displaced);
            }
        }
        // Only the last old child per key can be matched; the rest go.
        for displaced in duplicates {
            self.delete_child(parent, displaced)?;
        }

        let mut first = None;
        let mut previous: Option<FiberId> = None;
        let mut last_placed_index = 0;
        for (index, child) in children.iter().enumerate() {
            let Some(fiber) = self.update_from_map(&mut existing, index, child)? else {
                continue;
            };
            let node = self.fibers.node_mut(fiber)?;
            node.index = index;
            node.parent = Some(parent);
            node.sibling = None;

            last_placed_index = self.place_child(fiber, last_placed_index)?;
            match previous {
                Some(prev) => self.fibers.node_mut(prev)?.sibling = Some(fiber),
                None => first = Some(fiber),
            }
            previous = Some(fiber);
        }

        let mut leftovers = Vec::with_capacity(existing.len());
        for id in existing.into_values() {
            leftovers.push((self.fibers.node(id)?.index, id));
        }
        leftovers.sort_unstable();
        for (_, id) in leftovers {
            self.delete_child(parent, id)?;
        }
        Ok(first)
    }

    /// Remove and return the old child under `slot` if `reusable` accepts it.
    fn take_matching(
        &self,
        existing: &mut FxHashMap<SlotKey, FiberId>,
        slot: &SlotKey,
        reusable: impl Fn(&WorkNode<I>) -> bool,
    ) -> Result<Option<FiberId>> {
        let Some(&current) = existing.get(slot) else {
            return Ok(None);
        };
        if !reusable(self.fibers.node(current)?) {
            return Ok(None);
        }
        existing.remove(slot);
        Ok(Some(current))
    }

    fn update_from_map(
        &mut self,
        existing: &mut FxHashMap<SlotKey, FiberId>,
        index: usize,
        child: &Node,
    ) -> Result<Option<FiberId>> {
        match child {
            Node::Text(text) => {
                let matched =
                    self.take_matching(existing, &SlotKey::Index(index), |node| node.tag == WorkTag::HostText)?;
                let props = WorkProps::Text(Rc::clone(text));
                let fiber = match matched {
                    Some(current) => self.use_fiber(current, props)?,
                    None => self.fibers.insert(WorkNode::from_text(Rc::clone(text))),
                };
                Ok(Some(fiber))
            }
            Node::Element(element) => {
                let slot = element
                    .key
                    .clone()
                    .map_or(SlotKey::Index(index), SlotKey::Key);
                let matched =
                    self.take_matching(existing, &slot, |node| node.element_type.matches(&element.kind))?;
                let fiber = match matched {
                    Some(current) => self.use_fiber(current, WorkProps::from_element(element))?,
                    None => self.fibers.insert(WorkNode::from_element(element)),
                };
                Ok(Some(fiber))
            }
            Node::List(_) => {
                // Nested lists behave as unkeyed fragments.
                let matched = self.take_matching(existing, &SlotKey::Index(index), |node| {
                    node.tag == WorkTag::Fragment
                })?;
                let fiber = match matched {
                    Some(current) => self.use_fiber(current, WorkProps::Fragment(child.clone()))?,
                    None => self.fibers.insert(WorkNode::from_fragment(child.clone(), None)),
                };
                Ok(Some(fiber))
            }
            Node::Empty => Ok(None),
            Node::Opaque(_) => {
                warn!("unsupported child value at index {index}, skipping");
                Ok(None)
            }
        }
    }
}
