//! Immutable id-addressed documents and a small builder for assembling them.
//!
//! ```
//! use xquery_core::store::{Store, elem, text};
//!
//! // <root id="r"><child>Hello</child><child/></root>
//! let store = Store::new();
//! let doc = store.add_document(
//!     "test.xml",
//!     elem("root")
//!         .attr("id", "r")
//!         .child(elem("child").child(text("Hello")))
//!         .child(elem("child")),
//! );
//! assert_eq!(doc.string_value(&xquery_core::store::NodeId::document()), "Hello");
//! ```
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

use string_cache::DefaultAtom as Atom;

use super::index::StructuralIndex;
use super::node_id::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(pub u32);

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

#[derive(Debug, Clone)]
pub struct StoredNode {
    kind: NodeKind,
    name: Option<Atom>,
    value: Option<String>,
    attributes: Vec<NodeId>,
    children: Vec<NodeId>,
}

impl StoredNode {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }
    pub fn name(&self) -> Option<&Atom> {
        self.name.as_ref()
    }
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
    pub fn attributes(&self) -> &[NodeId] {
        &self.attributes
    }
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

pub struct Document {
    id: DocId,
    uri: String,
    temporary: bool,
    nodes: BTreeMap<NodeId, StoredNode>,
    index: StructuralIndex,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("uri", &self.uri)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl Document {
    pub(crate) fn build(id: DocId, uri: String, temporary: bool, roots: Vec<NodeSpec>) -> Self {
        let mut nodes = BTreeMap::new();
        let mut index = StructuralIndex::default();
        let doc_id = NodeId::document();
        let mut children = Vec::with_capacity(roots.len());
        for (i, spec) in roots.into_iter().enumerate() {
            let child_id = doc_id.child(position(i));
            insert_spec(&mut nodes, &mut index, child_id.clone(), spec);
            children.push(child_id);
        }
        nodes.insert(
            doc_id,
            StoredNode {
                kind: NodeKind::Document,
                name: None,
                value: None,
                attributes: Vec::new(),
                children,
            },
        );
        Self {
            id,
            uri,
            temporary,
            nodes,
            index,
        }
    }

    pub fn id(&self) -> DocId {
        self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Documents holding constructed nodes are not registered in the store
    /// and never form persistent node sets.
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn node(&self, id: &NodeId) -> Option<&StoredNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn kind(&self, id: &NodeId) -> Option<NodeKind> {
        self.nodes.get(id).map(StoredNode::kind)
    }

    pub fn name(&self, id: &NodeId) -> Option<&Atom> {
        self.nodes.get(id).and_then(StoredNode::name)
    }

    pub fn children(&self, id: &NodeId) -> &[NodeId] {
        match self.nodes.get(id) {
            Some(node) => &node.children,
            None => &[],
        }
    }

    pub fn attributes(&self, id: &NodeId) -> &[NodeId] {
        match self.nodes.get(id) {
            Some(node) => &node.attributes,
            None => &[],
        }
    }

    pub fn index(&self) -> &StructuralIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node of the document in document order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> + '_ {
        self.nodes.keys()
    }

    /// Descendants of `id` (attributes included) in document order.
    pub fn descendants<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.nodes
            .range((Bound::Excluded(id.clone()), Bound::Unbounded))
            .map(|(k, _)| k)
            .take_while(move |k| k.is_descendant_of(id))
    }

    /// Nodes after `id` in document order that are not its descendants.
    pub fn following<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.nodes
            .range((Bound::Excluded(id.clone()), Bound::Unbounded))
            .map(|(k, _)| k)
            .filter(move |k| !k.is_descendant_of(id))
    }

    /// Nodes before `id` in document order that are not its ancestors.
    pub fn preceding<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.nodes
            .range((Bound::Unbounded, Bound::Excluded(id.clone())))
            .map(|(k, _)| k)
            .filter(move |k| !id.is_descendant_of(k))
    }

    pub fn string_value(&self, id: &NodeId) -> String {
        let Some(node) = self.nodes.get(id) else {
            return String::new();
        };
        match node.kind {
            NodeKind::Document | NodeKind::Element => {
                let mut out = String::new();
                for d in self.descendants(id) {
                    if let Some(n) = self.nodes.get(d)
                        && n.kind == NodeKind::Text
                    {
                        out.push_str(n.value.as_deref().unwrap_or_default());
                    }
                }
                out
            }
            _ => node.value.clone().unwrap_or_default(),
        }
    }
}

fn position(i: usize) -> u32 {
    u32::try_from(i + 1).unwrap_or(u32::MAX)
}

fn insert_spec(
    nodes: &mut BTreeMap<NodeId, StoredNode>,
    index: &mut StructuralIndex,
    id: NodeId,
    spec: NodeSpec,
) {
    match spec {
        NodeSpec::Element(el) => {
            index.add_element(el.name.clone(), id.clone());
            let mut attributes = Vec::with_capacity(el.attributes.len());
            let mut next = 0usize;
            for (name, value) in el.attributes {
                let attr_id = id.child(position(next));
                next += 1;
                index.add_attribute(name.clone(), attr_id.clone());
                nodes.insert(
                    attr_id.clone(),
                    StoredNode {
                        kind: NodeKind::Attribute,
                        name: Some(name),
                        value: Some(value),
                        attributes: Vec::new(),
                        children: Vec::new(),
                    },
                );
                attributes.push(attr_id);
            }
            let mut children = Vec::with_capacity(el.children.len());
            for child in el.children {
                let child_id = id.child(position(next));
                next += 1;
                insert_spec(nodes, index, child_id.clone(), child);
                children.push(child_id);
            }
            nodes.insert(
                id,
                StoredNode {
                    kind: NodeKind::Element,
                    name: Some(el.name),
                    value: None,
                    attributes,
                    children,
                },
            );
        }
        NodeSpec::Text(value) => leaf(nodes, id, NodeKind::Text, None, value),
        NodeSpec::Comment(value) => leaf(nodes, id, NodeKind::Comment, None, value),
        NodeSpec::ProcessingInstruction { target, data } => {
            leaf(nodes, id, NodeKind::ProcessingInstruction, Some(target), data);
        }
    }
}

fn leaf(
    nodes: &mut BTreeMap<NodeId, StoredNode>,
    id: NodeId,
    kind: NodeKind,
    name: Option<Atom>,
    value: String,
) {
    nodes.insert(
        id,
        StoredNode {
            kind,
            name,
            value: Some(value),
            attributes: Vec::new(),
            children: Vec::new(),
        },
    );
}

/// Description of a subtree to be numbered into a [`Document`].
#[derive(Debug, Clone)]
pub enum NodeSpec {
    Element(ElementBuilder),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: Atom, data: String },
}

#[derive(Debug, Clone)]
pub struct ElementBuilder {
    name: Atom,
    attributes: Vec<(Atom, String)>,
    children: Vec<NodeSpec>,
}

impl ElementBuilder {
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push((Atom::from(name), value.to_string()));
        self
    }

    pub fn child(mut self, child: impl Into<NodeSpec>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, C>(mut self, it: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<NodeSpec>,
    {
        self.children.extend(it.into_iter().map(Into::into));
        self
    }

    pub fn text(self, value: &str) -> Self {
        self.child(text(value))
    }
}

impl From<ElementBuilder> for NodeSpec {
    fn from(b: ElementBuilder) -> Self {
        NodeSpec::Element(b)
    }
}

pub fn elem(name: &str) -> ElementBuilder {
    ElementBuilder {
        name: Atom::from(name),
        attributes: Vec::new(),
        children: Vec::new(),
    }
}

pub fn text(value: &str) -> NodeSpec {
    NodeSpec::Text(value.to_string())
}

pub fn comment(value: &str) -> NodeSpec {
    NodeSpec::Comment(value.to_string())
}

pub fn pi(target: &str, data: &str) -> NodeSpec {
    NodeSpec::ProcessingInstruction {
        target: Atom::from(target),
        data: data.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::build(
            DocId(1),
            "t.xml".into(),
            false,
            vec![
                elem("a")
                    .attr("x", "1")
                    .child(elem("b").text("one"))
                    .child(elem("c").child(elem("b").text("two")))
                    .into(),
            ],
        )
    }

    #[test]
    fn attributes_are_numbered_before_children() {
        let doc = sample();
        let a = NodeId::from_levels(&[1]);
        assert_eq!(doc.attributes(&a), &[NodeId::from_levels(&[1, 1])]);
        assert_eq!(
            doc.children(&a),
            &[NodeId::from_levels(&[1, 2]), NodeId::from_levels(&[1, 3])]
        );
        assert_eq!(doc.kind(&NodeId::from_levels(&[1, 1])), Some(NodeKind::Attribute));
    }

    #[test]
    fn string_value_concatenates_text() {
        let doc = sample();
        assert_eq!(doc.string_value(&NodeId::document()), "onetwo");
        assert_eq!(doc.string_value(&NodeId::from_levels(&[1, 1])), "1");
    }

    #[test]
    fn navigation_ranges() {
        let doc = sample();
        let c = NodeId::from_levels(&[1, 3]);
        let desc: Vec<String> = doc.descendants(&c).map(ToString::to_string).collect();
        assert_eq!(desc, vec!["1.3.1", "1.3.1.1"]);
        let b = NodeId::from_levels(&[1, 2]);
        let foll: Vec<String> = doc.following(&b).map(ToString::to_string).collect();
        assert_eq!(foll, vec!["1.3", "1.3.1", "1.3.1.1"]);
        let prec: Vec<String> = doc.preceding(&c).map(ToString::to_string).collect();
        assert_eq!(prec, vec!["1.1", "1.2", "1.2.1"]);
    }
}
