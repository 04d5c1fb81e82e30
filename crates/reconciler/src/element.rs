//! Element descriptors: the immutable tree a render produces.

use crate::hooks::RenderScope;
use anyhow::Result;
use core::any::Any;
use core::fmt;
use smallvec::SmallVec;
use std::rc::Rc;

/// Stable identity of a child among its siblings.
#[derive(Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Key(Rc<str>);

impl Key {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self(Rc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self(Rc::from(value))
    }
}

impl From<u64> for Key {
    fn from(value: u64) -> Self {
        Self(Rc::from(value.to_string()))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Host attribute list, in declaration order.
pub type Attributes = SmallVec<(String, String), 4>;

/// Property bag of an element.
#[derive(Clone, Default)]
pub struct Props {
    /// Host attributes. Opaque to the reconciler apart from change detection.
    pub attributes: Attributes,
    /// Declared children.
    pub children: Node,
    /// Arbitrary component input.
    pub value: Option<Rc<dyn Any>>,
}

impl Props {
    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Downcast the component input.
    pub fn value<T: Any>(&self) -> Option<&T> {
        self.value
            .as_deref()
            .and_then(|value| value.downcast_ref::<T>())
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Props")
            .field("attributes", &self.attributes)
            .field("children", &self.children)
            .field("value", &self.value.as_ref().map(|_| ".."))
            .finish()
    }
}

type RenderFn = dyn Fn(&mut RenderScope<'_>, &Props) -> Result<Node>;

/// A function component. Identity is the identity of the shared render function.
#[derive(Clone)]
pub struct Component {
    name: &'static str,
    render: Rc<RenderFn>,
}

impl Component {
    pub fn new<F>(name: &'static str, render: F) -> Self
    where
        F: Fn(&mut RenderScope<'_>, &Props) -> Result<Node> + 'static,
    {
        Self {
            name,
            render: Rc::new(render),
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Run the render function.
    #[inline]
    pub fn render(&self, scope: &mut RenderScope<'_>, props: &Props) -> Result<Node> {
        (self.render)(scope, props)
    }

    /// Start an element of this component.
    #[inline]
    pub fn element(&self) -> ElementBuilder {
        ElementBuilder::new(ElementKind::Component(self.clone()))
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "Component({})", self.name)
    }
}

/// Type identity of an element.
#[derive(Clone, Debug, PartialEq)]
pub enum ElementKind {
    /// Primitive host node, e.g. `div`.
    Host(Rc<str>),
    /// Function component.
    Component(Component),
    /// Splices its children into the parent without a host wrapper.
    Fragment,
}

/// One element descriptor.
#[derive(Clone, Debug)]
pub struct Element {
    pub kind: ElementKind,
    pub key: Option<Key>,
    pub props: Rc<Props>,
}

/// Children shape accepted by the reconciler.
#[derive(Clone, Default)]
pub enum Node {
    /// Renders nothing.
    #[default]
    Empty,
    /// A text node.
    Text(Rc<str>),
    /// A single element.
    Element(Rc<Element>),
    /// An ordered list of children.
    List(Rc<[Node]>),
    /// A value the reconciler does not understand. Warned about and rendered as nothing.
    Opaque(Rc<dyn Any>),
}

impl Node {
    #[inline]
    pub fn text(text: impl AsRef<str>) -> Self {
        Self::Text(Rc::from(text.as_ref()))
    }

    #[inline]
    pub fn list(children: impl IntoIterator<Item = Self>) -> Self {
        Self::List(children.into_iter().collect())
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => formatter.write_str("Empty"),
            Self::Text(text) => write!(formatter, "Text({text:?})"),
            Self::Element(element) => element.fmt(formatter),
            Self::List(children) => formatter.debug_list().entries(children.iter()).finish(),
            Self::Opaque(_) => formatter.write_str("Opaque(..)"),
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(Rc::new(element))
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Self::Text(Rc::from(text))
    }
}

/// Small builder for element descriptors.
#[derive(Debug)]
pub struct ElementBuilder {
    kind: ElementKind,
    key: Option<Key>,
    attributes: Attributes,
    children: Vec<Node>,
    as_list: bool,
    value: Option<Rc<dyn Any>>,
}

impl ElementBuilder {
    fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            key: None,
            attributes: Attributes::new(),
            children: Vec::new(),
            as_list: false,
            value: None,
        }
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Append one child. A single child is kept as-is rather than wrapped in a list.
    #[must_use]
    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Set the children as an explicit list, even if it holds a single entry.
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children = children.into_iter().collect();
        self.as_list = true;
        self
    }

    /// Attach component input.
    #[must_use]
    pub fn value<T: Any>(mut self, value: T) -> Self {
        self.value = Some(Rc::new(value));
        self
    }

    pub fn build(self) -> Node {
        let children = if self.as_list || self.children.len() > 1 {
            Node::list(self.children)
        } else {
            self.children.into_iter().next().unwrap_or_default()
        };
        Node::from(Element {
            kind: self.kind,
            key: self.key,
            props: Rc::new(Props {
                attributes: self.attributes,
                children,
                value: self.value,
            }),
        })
    }
}

/// Start a host element.
#[inline]
pub fn host(tag: &str) -> ElementBuilder {
    ElementBuilder::new(ElementKind::Host(Rc::from(tag)))
}

/// Start a fragment.
#[inline]
pub fn fragment() -> ElementBuilder {
    ElementBuilder::new(ElementKind::Fragment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_single_child_unwrapped() {
        let Node::Element(element) = host("p").child("hello").build() else {
            panic!("expected an element");
        };
        assert!(matches!(element.props.children, Node::Text(_)));

        let Node::Element(listed) = host("ul").children([Node::text("a")]).build() else {
            panic!("expected an element");
        };
        assert!(matches!(&listed.props.children, Node::List(items) if items.len() == 1));
    }

    #[test]
    fn component_identity_is_pointer_identity() {
        let first = Component::new("Same", |_, _| Ok(Node::Empty));
        let second = Component::new("Same", |_, _| Ok(Node::Empty));
        assert_eq!(first, first.clone());
        assert_ne!(first, second);
    }
}
