use core::fmt;

use super::{DOM, DOMNode, NodeKey, NodeKind};
use indextree::NodeId;

use serde_json::{Map, Value, json};

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

/// Attributes sorted by name, for deterministic output.
fn sorted_attrs(node: &DOMNode) -> Vec<(&str, &str)> {
    let mut pairs: Vec<(&str, &str)> = node
        .attrs
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    pairs.sort_unstable_by(|left, right| left.0.cmp(right.0));
    pairs
}

fn node_to_json(dom: &DOM, id: NodeId) -> Value {
    let Some(node_ref) = dom.dom.get(id) else {
        return Value::Null;
    };
    let node = node_ref.get();
    let children = || -> Vec<Value> {
        id.children(&dom.dom)
            .map(|child| node_to_json(dom, child))
            .filter(|value| !value.is_null())
            .collect()
    };
    match &node.kind {
        NodeKind::Document => json!({ "type": "document", "children": children() }),
        NodeKind::Element { tag } => {
            let mut attrs_obj = Map::new();
            for (name, value) in sorted_attrs(node) {
                attrs_obj.insert(name.to_string(), Value::String(value.to_string()));
            }
            json!({
                "type": "element",
                "key": node.key.0,
                "tag": tag,
                "attrs": Value::Object(attrs_obj),
                "children": children(),
            })
        }
        NodeKind::Text { text } => json!({ "type": "text", "key": node.key.0, "text": text }),
    }
}

fn write_indent(formatter: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        formatter.write_str("  ")?;
    }
    Ok(())
}

fn fmt_node(dom: &DOM, id: NodeId, formatter: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    let Some(node_ref) = dom.dom.get(id) else {
        return Ok(());
    };
    let node = node_ref.get();
    write_indent(formatter, depth)?;
    match &node.kind {
        NodeKind::Document => {
            writeln!(formatter, "#document")?;
        }
        NodeKind::Element { tag } => {
            write!(formatter, "<{tag}")?;
            for (name, value) in sorted_attrs(node) {
                write!(formatter, " {name}=\"{}\"", escape_text(value))?;
            }
            if id.children(&dom.dom).next().is_none() {
                return writeln!(formatter, " />");
            }
            writeln!(formatter, ">")?;
            for child in id.children(&dom.dom) {
                fmt_node(dom, child, formatter, depth + 1)?;
            }
            write_indent(formatter, depth)?;
            return writeln!(formatter, "</{tag}>");
        }
        NodeKind::Text { text } => {
            writeln!(formatter, "\"{}\"", escape_text(text))?;
        }
    }
    for child in id.children(&dom.dom) {
        fmt_node(dom, child, formatter, depth + 1)?;
    }
    Ok(())
}

/// Indented tree with one node per line; empty elements are self-closing.
impl fmt::Debug for DOM {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(formatter, "DOM")?;
        fmt_node(self, self.root, formatter, 0)
    }
}

impl DOM {
    /// Build a deterministic JSON representation of the DOM.
    /// Schema:
    /// - Document: { "type":"document", "children":[ ... ] }
    /// - Element: { "type":"element", "key": 1, "tag": "div", "attrs": {..}, "children":[ ... ] }
    /// - Text: { "type":"text", "key": 2, "text":"..." }
    pub fn to_json_value(&self) -> Value {
        node_to_json(self, self.root)
    }

    /// JSON of the subtree at `key`, or `null` if it does not exist.
    pub fn subtree_json(&self, key: NodeKey) -> Value {
        self.keys
            .get(&key)
            .map_or(Value::Null, |id| node_to_json(self, *id))
    }

    /// Pretty JSON string for snapshots and test comparisons.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(&self.to_json_value()).unwrap_or_else(|_| String::from("{}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconciler::{HostConfig, Props};

    #[test]
    fn debug_output_is_indented_and_sorted() {
        let mut dom = DOM::new();
        let container = dom.create_container("main").unwrap();
        let props = Props {
            attributes: [("title".to_string(), "x\"y".to_string()), ("id".to_string(), "a".to_string())]
                .into_iter()
                .collect(),
            ..Props::default()
        };
        let item = dom.create_instance("p", &props).unwrap();
        let text = dom.create_text_instance("hi\n").unwrap();
        dom.append_initial_child(&item, &text).unwrap();
        dom.append_child(&container, &item).unwrap();

        assert_eq!(
            format!("{dom:?}"),
            "DOM\n#document\n  <main>\n    <p id=\"a\" title=\"x\\\"y\">\n      \"hi\\n\"\n    </p>\n  </main>\n"
        );
    }

    #[test]
    fn json_snapshot_carries_keys() {
        let mut dom = DOM::new();
        let container = dom.create_container("main").unwrap();
        let text = dom.create_text_instance("hello").unwrap();
        dom.append_child(&container, &text).unwrap();
        assert_eq!(
            dom.subtree_json(container),
            json!({
                "type": "element",
                "key": container.0,
                "tag": "main",
                "attrs": {},
                "children": [{ "type": "text", "key": text.0, "text": "hello" }],
            })
        );
        assert_eq!(dom.subtree_json(NodeKey(77)), Value::Null);
        assert!(dom.to_json_string().starts_with('{'));
    }
}
