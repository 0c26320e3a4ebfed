use std::collections::HashMap;

use string_cache::DefaultAtom as Atom;

use super::node_id::NodeId;

/// Per-document name index. Ids are recorded while the document is numbered
/// in document order, so every list is already sorted.
#[derive(Debug, Default)]
pub struct StructuralIndex {
    elements: HashMap<Atom, Vec<NodeId>>,
    attributes: HashMap<Atom, Vec<NodeId>>,
}

impl StructuralIndex {
    pub(crate) fn add_element(&mut self, name: Atom, id: NodeId) {
        self.elements.entry(name).or_default().push(id);
    }

    pub(crate) fn add_attribute(&mut self, name: Atom, id: NodeId) {
        self.attributes.entry(name).or_default().push(id);
    }

    pub fn elements(&self, name: &str) -> &[NodeId] {
        self.elements
            .get(&Atom::from(name))
            .map_or(&[][..], Vec::as_slice)
    }

    pub fn attributes(&self, name: &str) -> &[NodeId] {
        self.attributes
            .get(&Atom::from(name))
            .map_or(&[][..], Vec::as_slice)
    }
}
