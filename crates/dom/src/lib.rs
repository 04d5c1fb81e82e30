//! In-memory document the reconciler renders into.
//!
//! Nodes live in an `indextree` arena and are addressed by stable
//! [`NodeKey`]s. Every change to the attached tree is recorded as a
//! [`DOMUpdate`]; the updates of one commit form one batch, which any
//! [`DOMSubscriber`] can replay to mirror the document.

#![allow(clippy::missing_errors_doc, reason = "Host operations only fail on unknown or misplaced node keys")]

pub mod printing;
pub mod updating;

pub use updating::{DOMSubscriber, DOMUpdate};

use anyhow::{Result, anyhow};
use core::fmt;
use core::mem;
use indextree::{Arena, Node as ArenaNode, NodeId};
use log::{debug, trace};
use reconciler::{HostConfig, Props};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Stable key of a DOM node, shared with mirrors through [`DOMUpdate`]s.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct NodeKey(pub u64);

impl NodeKey {
    /// The document node (always present).
    pub const ROOT: Self = Self(0);
}

impl fmt::Display for NodeKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "node#{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub enum NodeKind {
    #[default]
    Document,
    Element {
        tag: String,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DOMNode {
    pub key: NodeKey,
    pub kind: NodeKind,
    pub attrs: SmallVec<(String, String), 4>,
}

/// The document plus its pending and committed mutation batches.
pub struct DOM {
    dom: Arena<DOMNode>,
    root: NodeId,
    keys: FxHashMap<NodeKey, NodeId>,
    next_key: u64,
    pending: Vec<DOMUpdate>,
    batches: Vec<Vec<DOMUpdate>>,
}

impl Default for DOM {
    fn default() -> Self {
        Self::new()
    }
}

impl DOM {
    pub fn new() -> Self {
        let mut dom = Arena::new();
        let root = dom.new_node(DOMNode::default());
        let mut keys = FxHashMap::default();
        keys.insert(NodeKey::ROOT, root);
        Self {
            dom,
            root,
            keys,
            next_key: 0,
            pending: Vec::new(),
            batches: Vec::new(),
        }
    }

    /// Append a fresh, empty element to the document to render into.
    ///
    /// The insertion is committed as a batch of its own.
    pub fn create_container(&mut self, tag: &str) -> Result<NodeKey> {
        let key = self.new_node(
            NodeKind::Element { tag: tag.to_string() },
            SmallVec::new(),
        );
        self.append_child(&NodeKey::ROOT, &key)?;
        self.reset_after_commit();
        Ok(key)
    }

    /// Committed mutation batches since the last call, one per commit that
    /// changed the attached tree.
    pub fn take_batches(&mut self) -> Vec<Vec<DOMUpdate>> {
        mem::take(&mut self.batches)
    }

    /// Number of live nodes, the document included.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether only the document node exists.
    pub fn is_empty(&self) -> bool {
        self.keys.len() == 1
    }

    pub fn get(&self, key: NodeKey) -> Option<&DOMNode> {
        let id = self.keys.get(&key)?;
        self.dom.get(*id).map(ArenaNode::get)
    }

    pub fn children(&self, key: NodeKey) -> Vec<NodeKey> {
        self.keys.get(&key).map_or_else(Vec::new, |id| {
            id.children(&self.dom)
                .filter_map(|child| self.dom.get(child).map(|node| node.get().key))
                .collect()
        })
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.keys.get(&key)?.parent(&self.dom)?;
        self.dom.get(parent).map(|node| node.get().key)
    }

    /// Whether `key` is reachable from the document node.
    pub fn is_attached(&self, key: NodeKey) -> bool {
        self.keys
            .get(&key)
            .is_some_and(|id| id.ancestors(&self.dom).any(|ancestor| ancestor == self.root))
    }

    fn new_node(&mut self, kind: NodeKind, attrs: SmallVec<(String, String), 4>) -> NodeKey {
        self.next_key += 1;
        let key = NodeKey(self.next_key);
        self.insert_node(key, kind, attrs);
        key
    }

    fn insert_node(&mut self, key: NodeKey, kind: NodeKind, attrs: SmallVec<(String, String), 4>) -> NodeId {
        let id = self.dom.new_node(DOMNode { key, kind, attrs });
        self.keys.insert(key, id);
        self.next_key = self.next_key.max(key.0);
        id
    }

    fn id(&self, key: NodeKey) -> Result<NodeId> {
        self.keys
            .get(&key)
            .copied()
            .ok_or_else(|| anyhow!("unknown DOM node {key}"))
    }

    fn node_mut(&mut self, key: NodeKey) -> Result<&mut DOMNode> {
        let id = self.id(key)?;
        self.dom
            .get_mut(id)
            .map(ArenaNode::get_mut)
            .ok_or_else(|| anyhow!("{key} was removed from the arena"))
    }

    /// Index of `id` among its siblings.
    fn position(&self, id: NodeId) -> usize {
        id.preceding_siblings(&self.dom).skip(1).count()
    }

    /// Insert `id` under `parent` so that it ends up at child index `pos`.
    fn place(&mut self, parent: NodeId, id: NodeId, pos: usize) -> Result<()> {
        id.detach(&mut self.dom);
        match parent.children(&self.dom).nth(pos) {
            Some(next) => next.checked_insert_before(id, &mut self.dom)?,
            None => parent.checked_append(id, &mut self.dom)?,
        }
        Ok(())
    }

    /// Drop the subtree at `id` from the arena and forget its keys.
    fn remove_subtree(&mut self, id: NodeId) {
        let keys: Vec<NodeKey> = id
            .descendants(&self.dom)
            .filter_map(|node| self.dom.get(node).map(|node_ref| node_ref.get().key))
            .collect();
        id.remove_subtree(&mut self.dom);
        for key in keys {
            self.keys.remove(&key);
        }
    }

    /// Log a freshly attached subtree, parents before children.
    fn record_subtree(&mut self, id: NodeId) {
        let nodes: Vec<NodeId> = id.descendants(&self.dom).collect();
        for node_id in nodes {
            let Some(parent_node) = node_id.parent(&self.dom).and_then(|parent| self.dom.get(parent)) else {
                continue;
            };
            let parent = parent_node.get().key;
            let pos = self.position(node_id);
            let Some(node) = self.dom.get(node_id).map(ArenaNode::get) else {
                continue;
            };
            match &node.kind {
                NodeKind::Element { tag } => {
                    self.pending.push(DOMUpdate::InsertElement {
                        parent,
                        node: node.key,
                        tag: tag.clone(),
                        pos,
                    });
                    for (name, value) in &node.attrs {
                        self.pending.push(DOMUpdate::SetAttr {
                            node: node.key,
                            name: name.clone(),
                            value: value.clone(),
                        });
                    }
                }
                NodeKind::Text { text } => self.pending.push(DOMUpdate::InsertText {
                    parent,
                    node: node.key,
                    text: text.clone(),
                    pos,
                }),
                NodeKind::Document => {}
            }
        }
    }

    /// Shared tail of `append_child` and `insert_before`.
    fn record_insertion(&mut self, parent: NodeKey, child: NodeKey, was_attached: bool) -> Result<()> {
        if !self.is_attached(parent) {
            return Ok(());
        }
        let id = self.id(child)?;
        if was_attached {
            let pos = self.position(id);
            self.pending.push(DOMUpdate::MoveNode {
                parent,
                node: child,
                pos,
            });
        } else {
            self.record_subtree(id);
        }
        Ok(())
    }
}

impl HostConfig for DOM {
    type Instance = NodeKey;

    fn create_instance(&mut self, tag: &str, props: &Props) -> Result<NodeKey> {
        let key = self.new_node(
            NodeKind::Element { tag: tag.to_string() },
            props.attributes.clone(),
        );
        trace!("created <{tag}> as {key}");
        Ok(key)
    }

    fn create_text_instance(&mut self, text: &str) -> Result<NodeKey> {
        Ok(self.new_node(NodeKind::Text { text: text.to_string() }, SmallVec::new()))
    }

    fn append_initial_child(&mut self, parent: &NodeKey, child: &NodeKey) -> Result<()> {
        let (parent_id, child_id) = (self.id(*parent)?, self.id(*child)?);
        parent_id.checked_append(child_id, &mut self.dom)?;
        Ok(())
    }

    fn append_child(&mut self, parent: &NodeKey, child: &NodeKey) -> Result<()> {
        let was_attached = self.is_attached(*child);
        let (parent_id, child_id) = (self.id(*parent)?, self.id(*child)?);
        parent_id.checked_append(child_id, &mut self.dom)?;
        self.record_insertion(*parent, *child, was_attached)
    }

    fn insert_before(&mut self, parent: &NodeKey, child: &NodeKey, before: &NodeKey) -> Result<()> {
        let was_attached = self.is_attached(*child);
        let (parent_id, before_id) = (self.id(*parent)?, self.id(*before)?);
        if before_id.parent(&self.dom) != Some(parent_id) {
            return Err(anyhow!("{before} is not a child of {parent}"));
        }
        before_id.checked_insert_before(self.id(*child)?, &mut self.dom)?;
        self.record_insertion(*parent, *child, was_attached)
    }

    fn remove_child(&mut self, parent: &NodeKey, child: &NodeKey) -> Result<()> {
        let (parent_id, child_id) = (self.id(*parent)?, self.id(*child)?);
        if child_id.parent(&self.dom) != Some(parent_id) {
            return Err(anyhow!("{child} is not a child of {parent}"));
        }
        let was_attached = self.is_attached(*parent);
        self.remove_subtree(child_id);
        if was_attached {
            self.pending.push(DOMUpdate::RemoveNode { node: *child });
        }
        Ok(())
    }

    fn commit_text_update(&mut self, instance: &NodeKey, _old_text: &str, new_text: &str) -> Result<()> {
        let node = self.node_mut(*instance)?;
        node.kind = NodeKind::Text {
            text: new_text.to_string(),
        };
        if self.is_attached(*instance) {
            self.pending.push(DOMUpdate::UpdateText {
                node: *instance,
                text: new_text.to_string(),
            });
        }
        Ok(())
    }

    fn commit_update(&mut self, instance: &NodeKey, old_props: &Props, new_props: &Props) -> Result<()> {
        let mut changes = Vec::new();
        for (name, _) in &old_props.attributes {
            if new_props.attribute(name).is_none() {
                changes.push(DOMUpdate::RemoveAttr {
                    node: *instance,
                    name: name.clone(),
                });
            }
        }
        for (name, value) in &new_props.attributes {
            if old_props.attribute(name) != Some(value.as_str()) {
                changes.push(DOMUpdate::SetAttr {
                    node: *instance,
                    name: name.clone(),
                    value: value.clone(),
                });
            }
        }
        self.node_mut(*instance)?.attrs = new_props.attributes.clone();
        if self.is_attached(*instance) {
            self.pending.extend(changes);
        }
        Ok(())
    }

    fn reset_after_commit(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        debug!("DOM commit batch of {} updates", self.pending.len());
        self.batches.push(mem::take(&mut self.pending));
    }
}
