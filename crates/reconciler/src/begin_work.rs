//! Begin phase: compute a node's output and diff its children.

use crate::child_fibers::ChildReconciler;
use crate::element::{ElementKind, Node};
use crate::engine::Engine;
use crate::error::ReconcileError;
use crate::fiber::{ElementType, FiberId, WorkProps, WorkTag};
use crate::hooks::RenderScope;
use crate::host_config::HostConfig;
use anyhow::{Result, anyhow};
use core::mem;
use log::trace;
use std::rc::Rc;

impl<H: HostConfig + 'static> Engine<H> {
    /// Process `unit` top-down, returning its first child to visit next.
    pub(crate) fn begin_work(&mut self, unit: FiberId) -> Result<Option<FiberId>> {
        let node = self.fibers.node(unit)?;
        trace!("begin {unit} ({:?})", node.tag);
        match node.tag {
            WorkTag::HostRoot => self.update_host_root(unit),
            WorkTag::HostComponent => {
                let children = node
                    .pending_props
                    .props()
                    .map(|props| props.children.clone())
                    .unwrap_or_default();
                self.reconcile_children(unit, &children)
            }
            WorkTag::HostText => Ok(None),
            WorkTag::FunctionComponent => self.update_function_component(unit),
            WorkTag::Fragment => {
                let children = match &node.pending_props {
                    WorkProps::Fragment(children) => children.clone(),
                    WorkProps::None | WorkProps::Element(_) | WorkProps::Text(_) => Node::Empty,
                };
                self.reconcile_children(unit, &children)
            }
        }
    }

    /// Replay the root's element queue for the render lane.
    fn update_host_root(&mut self, unit: FiberId) -> Result<Option<FiberId>> {
        let lane = self.wip_render_lane;
        let current = self
            .fibers
            .node(unit)?
            .alternate
            .ok_or(ReconcileError::StaleNode(unit))?;
        let next = self
            .fibers
            .node_mut(current)?
            .root_state
            .as_mut()
            .map(|cell| cell.render(lane))
            .ok_or(ReconcileError::StaleNode(current))?;
        let children = next.memoized_state.clone();
        self.fibers.node_mut(unit)?.root_state = Some(next);
        self.reconcile_children(unit, &children)
    }

    fn update_function_component(&mut self, unit: FiberId) -> Result<Option<FiberId>> {
        let node = self.fibers.node(unit)?;
        let (component, props) = match (&node.element_type, node.pending_props.props()) {
            (ElementType::Kind(ElementKind::Component(component)), Some(props)) => {
                (component.clone(), Rc::clone(props))
            }
            _ => return Err(anyhow!("{unit} is not a function component")),
        };
        let current = node.alternate;

        // The committed hooks are lent to the render and always handed back,
        // so a failed or abandoned render leaves them intact.
        let mut current_hooks = match current {
            Some(id) => Some(mem::take(&mut self.fibers.node_mut(id)?.hooks)),
            None => None,
        };
        let outcome = {
            let mut scope = RenderScope::new(
                component.name(),
                unit,
                self.wip_render_lane,
                current_hooks.as_deref_mut(),
                Rc::clone(&self.shared),
            );
            component
                .render(&mut scope, &props)
                .and_then(|children| scope.finish().map(|(hooks, flags)| (children, hooks, flags)))
        };
        if let (Some(id), Some(hooks)) = (current, current_hooks) {
            self.fibers.node_mut(id)?.hooks = hooks;
        }

        let (children, hooks, flags) = outcome?;
        let wip = self.fibers.node_mut(unit)?;
        wip.hooks = hooks;
        wip.flags |= flags;
        self.reconcile_children(unit, &children)
    }

    /// Diff `children` against the committed children of `unit`.
    ///
    /// Side effects are tracked only when `unit` has a committed counterpart.
    fn reconcile_children(&mut self, unit: FiberId, children: &Node) -> Result<Option<FiberId>> {
        let (track, current_first) = match self.fibers.node(unit)?.alternate {
            Some(current) => (true, self.fibers.node(current)?.child),
            None => (false, None),
        };
        let child = ChildReconciler::new(&mut self.fibers, track).reconcile_child_fibers(
            unit,
            current_first,
            children,
        )?;
        self.fibers.node_mut(unit)?.child = child;
        Ok(child)
    }
}
