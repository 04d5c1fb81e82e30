#![allow(dead_code, reason = "Each test binary uses a different subset")]
use anyhow::{Result, anyhow};
use core::mem;
use reconciler::{Attributes, Engine, EngineConfig, HostConfig, Props};
use scheduler::ManualClock;
use std::rc::Rc;

/// One node of the recorded host tree.
#[derive(Debug, Clone)]
pub struct HostNode {
    pub tag: String,
    pub text: Option<String>,
    pub attributes: Attributes,
    pub parent: Option<u32>,
    pub children: Vec<u32>,
}

/// In-memory host that records every commit-time operation.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub nodes: Vec<HostNode>,
    pub ops: Vec<String>,
    pub commits: usize,
}

impl RecordingHost {
    /// Allocate a container node.
    pub fn container(&mut self) -> u32 {
        self.alloc("#root", None, Attributes::new())
    }

    fn alloc(&mut self, tag: &str, text: Option<String>, attributes: Attributes) -> u32 {
        self.nodes.push(HostNode {
            tag: tag.to_string(),
            text,
            attributes,
            parent: None,
            children: Vec::new(),
        });
        (self.nodes.len() - 1) as u32
    }

    fn node_mut(&mut self, id: u32) -> Result<&mut HostNode> {
        self.nodes
            .get_mut(id as usize)
            .ok_or_else(|| anyhow!("unknown host node {id}"))
    }

    fn detach(&mut self, child: u32) -> Result<()> {
        if let Some(parent) = self.node_mut(child)?.parent.take() {
            self.node_mut(parent)?.children.retain(|id| *id != child);
        }
        Ok(())
    }

    /// Compact rendering of the subtree at `id`, e.g. `ul(li#a("x"),li#b)`.
    pub fn snapshot(&self, id: u32) -> String {
        let node = &self.nodes[id as usize];
        if let Some(text) = &node.text {
            return format!("{text:?}");
        }
        let mut out = node.tag.clone();
        if let Some((_, value)) = node.attributes.iter().find(|(name, _)| name == "id") {
            out.push('#');
            out.push_str(value);
        }
        if !node.children.is_empty() {
            let children: Vec<String> = node.children.iter().map(|child| self.snapshot(*child)).collect();
            out.push('(');
            out.push_str(&children.join(","));
            out.push(')');
        }
        out
    }

    /// Ops recorded since the last call.
    pub fn take_ops(&mut self) -> Vec<String> {
        mem::take(&mut self.ops)
    }
}

impl HostConfig for RecordingHost {
    type Instance = u32;

    fn create_instance(&mut self, tag: &str, props: &Props) -> Result<u32> {
        Ok(self.alloc(tag, None, props.attributes.clone()))
    }

    fn create_text_instance(&mut self, text: &str) -> Result<u32> {
        Ok(self.alloc("#text", Some(text.to_string()), Attributes::new()))
    }

    fn append_initial_child(&mut self, parent: &u32, child: &u32) -> Result<()> {
        self.node_mut(*child)?.parent = Some(*parent);
        self.node_mut(*parent)?.children.push(*child);
        Ok(())
    }

    fn append_child(&mut self, parent: &u32, child: &u32) -> Result<()> {
        self.detach(*child)?;
        self.append_initial_child(parent, child)?;
        self.ops.push(format!("append {}", self.snapshot(*child)));
        Ok(())
    }

    fn insert_before(&mut self, parent: &u32, child: &u32, before: &u32) -> Result<()> {
        self.detach(*child)?;
        let siblings = &mut self.node_mut(*parent)?.children;
        let index = siblings
            .iter()
            .position(|id| id == before)
            .ok_or_else(|| anyhow!("{before} is not a child of {parent}"))?;
        siblings.insert(index, *child);
        self.node_mut(*child)?.parent = Some(*parent);
        self.ops.push(format!("insert {} before {}", self.snapshot(*child), self.snapshot(*before)));
        Ok(())
    }

    fn remove_child(&mut self, parent: &u32, child: &u32) -> Result<()> {
        let siblings = &mut self.node_mut(*parent)?.children;
        let before = siblings.len();
        siblings.retain(|id| id != child);
        if siblings.len() == before {
            return Err(anyhow!("{child} is not a child of {parent}"));
        }
        self.node_mut(*child)?.parent = None;
        self.ops.push(format!("remove {}", self.snapshot(*child)));
        Ok(())
    }

    fn commit_text_update(&mut self, instance: &u32, old_text: &str, new_text: &str) -> Result<()> {
        self.node_mut(*instance)?.text = Some(new_text.to_string());
        self.ops.push(format!("text {old_text:?} -> {new_text:?}"));
        Ok(())
    }

    fn commit_update(&mut self, instance: &u32, _old_props: &Props, new_props: &Props) -> Result<()> {
        self.node_mut(*instance)?.attributes = new_props.attributes.clone();
        self.ops.push(format!("update {}", self.snapshot(*instance)));
        Ok(())
    }

    fn reset_after_commit(&mut self) {
        self.commits += 1;
    }
}

/// Engine on a manual clock with a 5ms slice.
pub fn engine() -> (Engine<RecordingHost>, ManualClock, u32) {
    engine_with(EngineConfig::default().with_frame_yield_ms(5))
}

/// Like [`engine`], with an explicit configuration.
pub fn engine_with(config: EngineConfig) -> (Engine<RecordingHost>, ManualClock, u32) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = ManualClock::new();
    let mut host = RecordingHost::default();
    let container = host.container();
    let engine = Engine::with_clock(host, Rc::new(clock.clone()), config);
    (engine, clock, container)
}
