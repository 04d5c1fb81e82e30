//! Work nodes and the generational arena that owns them.
//!
//! Both buffers of the tree (current and work-in-progress) live in the same
//! arena. A node and its alternate refer to each other by [`FiberId`], so the
//! double buffer is just a pair of slots.

use crate::element::{Element, ElementKind, Key, Node, Props};
use crate::error::ReconcileError;
use crate::flags::EffectFlags;
use crate::hooks::Hook;
use crate::root::RootId;
use crate::update_queue::StateCell;
use anyhow::Result;
use core::fmt;
use log::trace;
use std::rc::Rc;

/// Stable handle to a work node. Stale handles are detected by generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct FiberId {
    index: u32,
    generation: u32,
}

impl fmt::Display for FiberId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "fiber#{}v{}", self.index, self.generation)
    }
}

/// What kind of position a work node represents.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WorkTag {
    HostRoot,
    HostComponent,
    HostText,
    FunctionComponent,
    Fragment,
}

impl WorkTag {
    #[inline]
    pub const fn is_host(self) -> bool {
        matches!(self, Self::HostComponent | Self::HostText)
    }
}

/// Type identity compared during reconciliation.
#[derive(Clone, Debug, PartialEq)]
pub enum ElementType {
    Root,
    Text,
    Kind(ElementKind),
}

impl ElementType {
    /// Whether a node of this type can be reused for `kind`.
    #[inline]
    pub fn matches(&self, kind: &ElementKind) -> bool {
        matches!(self, Self::Kind(own) if own == kind)
    }
}

/// Input of a work node.
#[derive(Clone, Debug, Default)]
pub enum WorkProps {
    #[default]
    None,
    /// Host or component element props.
    Element(Rc<Props>),
    /// Text content.
    Text(Rc<str>),
    /// Children spliced in by a fragment.
    Fragment(Node),
}

impl WorkProps {
    /// Props for a node created from `element`.
    pub fn from_element(element: &Element) -> Self {
        match element.kind {
            ElementKind::Fragment => Self::Fragment(element.props.children.clone()),
            ElementKind::Host(_) | ElementKind::Component(_) => {
                Self::Element(Rc::clone(&element.props))
            }
        }
    }

    #[inline]
    pub fn props(&self) -> Option<&Rc<Props>> {
        match self {
            Self::Element(props) => Some(props),
            Self::None | Self::Text(_) | Self::Fragment(_) => None,
        }
    }

    #[inline]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::None | Self::Element(_) | Self::Fragment(_) => None,
        }
    }
}

/// Host-side object backing a node.
#[derive(Clone, Debug, Default)]
pub enum StateNode<I> {
    #[default]
    None,
    /// Instance created through the host interface.
    Instance(I),
    /// The host root points back at its container.
    Root(RootId),
}

impl<I> StateNode<I> {
    #[inline]
    pub const fn instance(&self) -> Option<&I> {
        match self {
            Self::Instance(instance) => Some(instance),
            Self::None | Self::Root(_) => None,
        }
    }
}

/// One position in a rendered tree.
#[derive(Debug)]
pub struct WorkNode<I> {
    pub tag: WorkTag,
    pub key: Option<Key>,
    pub element_type: ElementType,
    pub state_node: StateNode<I>,

    pub parent: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    pub index: usize,

    pub pending_props: WorkProps,
    pub memoized_props: WorkProps,

    pub flags: EffectFlags,
    pub subtree_flags: EffectFlags,
    pub deletions: Vec<FiberId>,

    /// State cells and effects of a function component, in declaration order.
    pub hooks: Vec<Hook>,
    /// Element tree held by a host root.
    pub root_state: Option<StateCell<Node>>,

    pub alternate: Option<FiberId>,
}

impl<I> WorkNode<I> {
    pub fn new(tag: WorkTag, element_type: ElementType, key: Option<Key>, pending_props: WorkProps) -> Self {
        Self {
            tag,
            key,
            element_type,
            state_node: StateNode::None,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            pending_props,
            memoized_props: WorkProps::None,
            flags: EffectFlags::NONE,
            subtree_flags: EffectFlags::NONE,
            deletions: Vec::new(),
            hooks: Vec::new(),
            root_state: None,
            alternate: None,
        }
    }

    /// Node for an element descriptor.
    pub fn from_element(element: &Element) -> Self {
        let tag = match element.kind {
            ElementKind::Host(_) => WorkTag::HostComponent,
            ElementKind::Component(_) => WorkTag::FunctionComponent,
            ElementKind::Fragment => WorkTag::Fragment,
        };
        Self::new(
            tag,
            ElementType::Kind(element.kind.clone()),
            element.key.clone(),
            WorkProps::from_element(element),
        )
    }

    /// Node for a text child.
    pub fn from_text(text: Rc<str>) -> Self {
        Self::new(WorkTag::HostText, ElementType::Text, None, WorkProps::Text(text))
    }

    /// Unkeyed fragment wrapping a nested list of children.
    pub fn from_fragment(children: Node, key: Option<Key>) -> Self {
        Self::new(
            WorkTag::Fragment,
            ElementType::Kind(ElementKind::Fragment),
            key,
            WorkProps::Fragment(children),
        )
    }
}

struct Slot<I> {
    generation: u32,
    node: Option<WorkNode<I>>,
}

/// Generational slab of work nodes.
pub struct FiberArena<I> {
    slots: Vec<Slot<I>>,
    free: Vec<u32>,
    live: usize,
}

impl<I> Default for FiberArena<I> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }
}

impl<I> fmt::Debug for FiberArena<I> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("FiberArena")
            .field("live", &self.live)
            .field("capacity", &self.slots.len())
            .finish()
    }
}

impl<I> FiberArena<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn insert(&mut self, node: WorkNode<I>) -> FiberId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return FiberId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        FiberId {
            index,
            generation: 0,
        }
    }

    #[inline]
    pub fn get(&self, id: FiberId) -> Option<&WorkNode<I>> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut WorkNode<I>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    #[inline]
    pub fn contains(&self, id: FiberId) -> bool {
        self.get(id).is_some()
    }

    /// Checked access; a stale id is an error.
    #[inline]
    pub fn node(&self, id: FiberId) -> Result<&WorkNode<I>> {
        self.get(id)
            .ok_or_else(|| ReconcileError::StaleNode(id).into())
    }

    /// Checked mutable access; a stale id is an error.
    #[inline]
    pub fn node_mut(&mut self, id: FiberId) -> Result<&mut WorkNode<I>> {
        self.get_mut(id)
            .ok_or_else(|| ReconcileError::StaleNode(id).into())
    }

    fn remove(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        if slot.node.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index);
            self.live -= 1;
        }
    }

    /// Iterate over the sibling chain starting at `first`.
    pub fn siblings(&self, first: Option<FiberId>) -> Siblings<'_, I> {
        Siblings {
            arena: self,
            next: first,
        }
    }

    /// Pair `current` with a work-in-progress node carrying `pending_props`.
    ///
    /// Reuses the existing alternate when there is one, clearing its flags and
    /// deletions; otherwise allocates it and links both directions.
    pub fn create_work_in_progress(&mut self, current: FiberId, pending_props: WorkProps) -> Result<FiberId>
    where
        I: Clone,
    {
        let source = self.node(current)?;
        let tag = source.tag;
        let key = source.key.clone();
        let element_type = source.element_type.clone();
        let state_node = source.state_node.clone();
        let child = source.child;
        let sibling = source.sibling;
        let index = source.index;
        let memoized_props = source.memoized_props.clone();
        let alternate = source.alternate.filter(|id| self.contains(*id));

        let wip = if let Some(existing) = alternate {
            let node = self.node_mut(existing)?;
            node.pending_props = pending_props;
            node.flags = EffectFlags::NONE;
            node.subtree_flags = EffectFlags::NONE;
            node.deletions.clear();
            node.element_type = element_type;
            node.state_node = state_node;
            existing
        } else {
            let mut node = WorkNode::new(tag, element_type, key, pending_props);
            node.state_node = state_node;
            node.alternate = Some(current);
            let created = self.insert(node);
            self.node_mut(current)?.alternate = Some(created);
            trace!("created alternate {created} for {current}");
            created
        };

        let node = self.node_mut(wip)?;
        node.child = child;
        node.sibling = sibling;
        node.index = index;
        node.memoized_props = memoized_props;
        Ok(wip)
    }

    /// Reclaim every node unreachable from `roots`.
    ///
    /// Reachability follows child, sibling, alternate, and deletion links.
    pub fn collect_garbage(&mut self, roots: impl IntoIterator<Item = FiberId>) -> usize {
        let mut marked = vec![false; self.slots.len()];
        let mut stack: Vec<FiberId> = roots.into_iter().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else {
                continue;
            };
            let seen = &mut marked[id.index as usize];
            if *seen {
                continue;
            }
            *seen = true;
            stack.extend(node.child);
            stack.extend(node.sibling);
            stack.extend(node.alternate);
            stack.extend(node.deletions.iter().copied());
        }

        let mut reclaimed = 0;
        for (index, alive) in marked.into_iter().enumerate() {
            if !alive && self.slots[index].node.is_some() {
                self.remove(index as u32);
                reclaimed += 1;
            }
        }
        reclaimed
    }
}

/// Iterator over a sibling chain.
pub struct Siblings<'arena, I> {
    arena: &'arena FiberArena<I>,
    next: Option<FiberId>,
}

impl<I> Iterator for Siblings<'_, I> {
    type Item = FiberId;

    fn next(&mut self) -> Option<FiberId> {
        let id = self.next?;
        self.next = self.arena.get(id).and_then(|node| node.sibling);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(arena: &mut FiberArena<u32>, content: &str) -> FiberId {
        arena.insert(WorkNode::from_text(Rc::from(content)))
    }

    #[test]
    fn stale_ids_are_rejected_after_reuse() {
        let mut arena = FiberArena::<u32>::new();
        let first = text(&mut arena, "a");
        assert_eq!(arena.collect_garbage([]), 1);
        assert!(arena.get(first).is_none());

        let second = text(&mut arena, "b");
        assert_ne!(first, second);
        assert!(arena.node(first).is_err());
        assert_eq!(arena.node(second).unwrap().pending_props.text(), Some("b"));
    }

    #[test]
    fn work_in_progress_pairs_and_reuses_alternates() {
        let mut arena = FiberArena::<u32>::new();
        let current = text(&mut arena, "a");
        let wip = arena
            .create_work_in_progress(current, WorkProps::Text(Rc::from("b")))
            .unwrap();
        assert_eq!(arena.node(wip).unwrap().alternate, Some(current));
        assert_eq!(arena.node(current).unwrap().alternate, Some(wip));

        arena.node_mut(wip).unwrap().flags = EffectFlags::UPDATE;
        let again = arena
            .create_work_in_progress(current, WorkProps::Text(Rc::from("c")))
            .unwrap();
        assert_eq!(again, wip);
        assert!(arena.node(again).unwrap().flags.is_empty());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn garbage_collection_keeps_reachable_nodes() {
        let mut arena = FiberArena::<u32>::new();
        let parent = text(&mut arena, "p");
        let child = text(&mut arena, "c");
        let sibling = text(&mut arena, "s");
        let orphan = text(&mut arena, "o");
        arena.node_mut(parent).unwrap().child = Some(child);
        arena.node_mut(child).unwrap().sibling = Some(sibling);

        assert_eq!(arena.collect_garbage([parent]), 1);
        assert!(!arena.contains(orphan));
        assert_eq!(arena.siblings(Some(child)).collect::<Vec<_>>(), [child, sibling]);
    }
}
