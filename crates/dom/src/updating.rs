use super::{DOM, NodeKey, NodeKind};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One change to the attached document.
///
/// Positions are child indices after the change is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum DOMUpdate {
    InsertElement {
        parent: NodeKey,
        node: NodeKey,
        tag: String,
        pos: usize,
    },
    InsertText {
        parent: NodeKey,
        node: NodeKey,
        text: String,
        pos: usize,
    },
    MoveNode {
        parent: NodeKey,
        node: NodeKey,
        pos: usize,
    },
    SetAttr {
        node: NodeKey,
        name: String,
        value: String,
    },
    RemoveAttr {
        node: NodeKey,
        name: String,
    },
    RemoveNode {
        node: NodeKey,
    },
    UpdateText {
        node: NodeKey,
        text: String,
    },
}

/// A subscriber that receives DOMUpdate values and mirrors them into its own state.
pub trait DOMSubscriber {
    fn apply_update(&mut self, update: DOMUpdate) -> Result<()>;
}

/// A [`DOM`] can mirror another one. Replayed updates are applied directly
/// and not logged again.
impl DOMSubscriber for DOM {
    fn apply_update(&mut self, update: DOMUpdate) -> Result<()> {
        match update {
            DOMUpdate::InsertElement { parent, node, tag, pos } => {
                let parent_id = self.id(parent)?;
                let id = self.insert_node(node, NodeKind::Element { tag }, SmallVec::new());
                self.place(parent_id, id, pos)
            }
            DOMUpdate::InsertText { parent, node, text, pos } => {
                let parent_id = self.id(parent)?;
                let id = self.insert_node(node, NodeKind::Text { text }, SmallVec::new());
                self.place(parent_id, id, pos)
            }
            DOMUpdate::MoveNode { parent, node, pos } => {
                let (parent_id, id) = (self.id(parent)?, self.id(node)?);
                self.place(parent_id, id, pos)
            }
            DOMUpdate::SetAttr { node, name, value } => {
                let attrs = &mut self.node_mut(node)?.attrs;
                match attrs.iter_mut().find(|(existing, _)| *existing == name) {
                    Some(slot) => slot.1 = value,
                    None => attrs.push((name, value)),
                }
                Ok(())
            }
            DOMUpdate::RemoveAttr { node, name } => {
                self.node_mut(node)?.attrs.retain(|(existing, _)| *existing != name);
                Ok(())
            }
            DOMUpdate::RemoveNode { node } => {
                let id = self.id(node)?;
                self.remove_subtree(id);
                Ok(())
            }
            DOMUpdate::UpdateText { node, text } => match &mut self.node_mut(node)?.kind {
                NodeKind::Text { text: current } => {
                    *current = text;
                    Ok(())
                }
                NodeKind::Document | NodeKind::Element { .. } => Err(anyhow!("{node} is not a text node")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_serialize_with_an_op_tag() {
        let update = DOMUpdate::SetAttr {
            node: NodeKey(3),
            name: "class".into(),
            value: "done".into(),
        };
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"op":"SetAttr","node":3,"name":"class","value":"done"}"#);
        let back: DOMUpdate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, update);
    }

    #[test]
    fn mirror_applies_inserts_at_positions() {
        let mut mirror = DOM::new();
        let list = NodeKey(10);
        for update in [
            DOMUpdate::InsertElement {
                parent: NodeKey::ROOT,
                node: list,
                tag: "ol".into(),
                pos: 0,
            },
            DOMUpdate::InsertText {
                parent: list,
                node: NodeKey(12),
                text: "second".into(),
                pos: 0,
            },
            DOMUpdate::InsertText {
                parent: list,
                node: NodeKey(11),
                text: "first".into(),
                pos: 0,
            },
            DOMUpdate::SetAttr {
                node: list,
                name: "start".into(),
                value: "3".into(),
            },
        ] {
            mirror.apply_update(update).unwrap();
        }
        assert_eq!(mirror.children(list), [NodeKey(11), NodeKey(12)]);
        assert!(mirror.is_attached(NodeKey(12)));

        mirror
            .apply_update(DOMUpdate::UpdateText {
                node: list,
                text: "nope".into(),
            })
            .unwrap_err();
    }
}
