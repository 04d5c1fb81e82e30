//! Complete phase: build or diff host instances and bubble flags upward.

use crate::element::ElementKind;
use crate::engine::Engine;
use crate::fiber::{ElementType, FiberId, StateNode, WorkTag};
use crate::flags::EffectFlags;
use crate::host_config::HostConfig;
use anyhow::{Result, anyhow};
use log::trace;
use std::rc::Rc;

impl<H: HostConfig + 'static> Engine<H> {
    pub(crate) fn complete_work(&mut self, unit: FiberId) -> Result<()> {
        match self.fibers.node(unit)?.tag {
            WorkTag::HostComponent => self.complete_host_component(unit)?,
            WorkTag::HostText => self.complete_host_text(unit)?,
            WorkTag::HostRoot | WorkTag::FunctionComponent | WorkTag::Fragment => {}
        }
        self.bubble_properties(unit)
    }

    fn complete_host_component(&mut self, unit: FiberId) -> Result<()> {
        let node = self.fibers.node(unit)?;
        let Some(props) = node.memoized_props.props().cloned() else {
            return Err(anyhow!("{unit} completed without props"));
        };

        if let (Some(current), Some(_)) = (node.alternate, node.state_node.instance()) {
            let changed = match self.fibers.node(current)?.memoized_props.props() {
                Some(old) => !Rc::ptr_eq(old, &props) && old.attributes != props.attributes,
                None => true,
            };
            if changed {
                self.fibers.node_mut(unit)?.flags |= EffectFlags::UPDATE;
            }
            return Ok(());
        }

        let ElementType::Kind(ElementKind::Host(tag)) = &node.element_type else {
            return Err(anyhow!("{unit} is not a host element"));
        };
        let tag = Rc::clone(tag);
        let instance = self.host.create_instance(&tag, &props)?;
        self.append_all_children(&instance, unit)?;
        self.fibers.node_mut(unit)?.state_node = StateNode::Instance(instance);
        trace!("created <{tag}> for {unit}");
        Ok(())
    }

    fn complete_host_text(&mut self, unit: FiberId) -> Result<()> {
        let node = self.fibers.node(unit)?;
        let text: Rc<str> = Rc::from(node.memoized_props.text().unwrap_or_default());

        if let (Some(current), Some(_)) = (node.alternate, node.state_node.instance()) {
            if self.fibers.node(current)?.memoized_props.text() != Some(&*text) {
                self.fibers.node_mut(unit)?.flags |= EffectFlags::UPDATE;
            }
            return Ok(());
        }

        let instance = self.host.create_text_instance(&text)?;
        self.fibers.node_mut(unit)?.state_node = StateNode::Instance(instance);
        Ok(())
    }

    /// Attach the topmost host nodes below `unit` to its fresh instance.
    fn append_all_children(&mut self, parent: &H::Instance, unit: FiberId) -> Result<()> {
        let mut next = self.fibers.node(unit)?.child;
        while let Some(id) = next {
            let node = self.fibers.node(id)?;
            if node.tag.is_host() {
                if let Some(instance) = node.state_node.instance() {
                    self.host.append_initial_child(parent, instance)?;
                }
            } else if let Some(child) = node.child {
                next = Some(child);
                continue;
            }

            // Climb until a sibling is found, stopping at `unit`.
            let mut cursor = id;
            next = loop {
                let climbed = self.fibers.node(cursor)?;
                if let Some(sibling) = climbed.sibling {
                    break Some(sibling);
                }
                match climbed.parent {
                    Some(parent_id) if parent_id != unit => cursor = parent_id,
                    _ => break None,
                }
            };
        }
        Ok(())
    }

    /// Fold the children's flags into `unit`'s subtree flags.
    fn bubble_properties(&mut self, unit: FiberId) -> Result<()> {
        let first = self.fibers.node(unit)?.child;
        let children: Vec<FiberId> = self.fibers.siblings(first).collect();
        let mut subtree_flags = EffectFlags::NONE;
        for child in children {
            let node = self.fibers.node_mut(child)?;
            subtree_flags |= node.flags | node.subtree_flags;
            node.parent = Some(unit);
        }
        self.fibers.node_mut(unit)?.subtree_flags |= subtree_flags;
        Ok(())
    }
}
