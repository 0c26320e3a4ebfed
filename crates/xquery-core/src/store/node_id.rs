use std::fmt;

use smallvec::SmallVec;

/// Hierarchical node identifier. Every level holds the 1-based position of
/// the node among its parent's attributes and children, so lexicographic
/// order of ids is document order and the parent id is a prefix.
///
/// The document node has the empty id.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(SmallVec<[u32; 8]>);

impl NodeId {
    pub fn document() -> Self {
        Self(SmallVec::new())
    }

    pub fn from_levels(levels: &[u32]) -> Self {
        Self(SmallVec::from_slice(levels))
    }

    pub fn levels(&self) -> &[u32] {
        &self.0
    }

    pub fn level(&self) -> usize {
        self.0.len()
    }

    pub fn is_document(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, position: u32) -> NodeId {
        let mut levels = self.0.clone();
        levels.push(position);
        NodeId(levels)
    }

    pub fn parent(&self) -> Option<NodeId> {
        if self.0.is_empty() {
            return None;
        }
        let mut levels = self.0.clone();
        levels.pop();
        Some(NodeId(levels))
    }

    /// Strict descendant test.
    pub fn is_descendant_of(&self, ancestor: &NodeId) -> bool {
        self.0.len() > ancestor.0.len() && self.0.starts_with(&ancestor.0)
    }

    pub fn is_child_of(&self, parent: &NodeId) -> bool {
        self.0.len() == parent.0.len() + 1 && self.0.starts_with(&parent.0)
    }

    /// Ancestor ids from the parent up to the document node.
    pub fn ancestors(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.0.len()).rev().map(|len| NodeId(SmallVec::from_slice(&self.0[..len])))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for (i, level) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{level}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_document_order() {
        let doc = NodeId::document();
        let a = doc.child(1);
        let a1 = a.child(1);
        let a2 = a.child(2);
        let b = doc.child(2);
        let mut ids = vec![b.clone(), a2.clone(), doc.clone(), a1.clone(), a.clone()];
        ids.sort();
        assert_eq!(ids, vec![doc, a, a1, a2, b]);
    }

    #[test]
    fn ancestry() {
        let n = NodeId::from_levels(&[1, 3, 2]);
        assert!(n.is_descendant_of(&NodeId::from_levels(&[1])));
        assert!(n.is_child_of(&NodeId::from_levels(&[1, 3])));
        assert!(!n.is_descendant_of(&n));
        let up: Vec<String> = n.ancestors().map(|a| a.to_string()).collect();
        assert_eq!(up, vec!["1.3", "1", "/"]);
    }
}
