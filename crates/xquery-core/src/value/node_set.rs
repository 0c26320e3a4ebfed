use std::sync::Arc;

use itertools::{EitherOrBoth, Itertools};

use super::node::NodeProxy;
use crate::context::ContextId;
use crate::store::{DocId, Document, NodeId};

/// Sorted, duplicate-free set of stored nodes supporting merge-based set
/// algebra. When two equal nodes meet, their correlation chains are merged.
#[derive(Clone, Default, Debug)]
pub struct NodeSet {
    nodes: Vec<NodeProxy>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(node: NodeProxy) -> Self {
        Self { nodes: vec![node] }
    }

    pub fn from_nodes<I: IntoIterator<Item = NodeProxy>>(it: I) -> Self {
        let mut nodes: Vec<NodeProxy> = it.into_iter().collect();
        nodes.sort();
        let mut out: Vec<NodeProxy> = Vec::with_capacity(nodes.len());
        for n in nodes {
            match out.last_mut() {
                Some(last) if *last == n => last.merge_context(&n),
                _ => out.push(n),
            }
        }
        Self { nodes: out }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeProxy> {
        self.nodes.iter()
    }

    pub fn as_slice(&self) -> &[NodeProxy] {
        &self.nodes
    }

    pub fn into_vec(self) -> Vec<NodeProxy> {
        self.nodes
    }

    fn position(&self, doc: DocId, node_id: &NodeId) -> Result<usize, usize> {
        self.nodes.binary_search_by(|n| {
            n.doc_id()
                .cmp(&doc)
                .then_with(|| n.node_id().cmp(node_id))
        })
    }

    pub fn get(&self, doc: DocId, node_id: &NodeId) -> Option<&NodeProxy> {
        self.position(doc, node_id).ok().map(|i| &self.nodes[i])
    }

    pub fn contains(&self, doc: DocId, node_id: &NodeId) -> bool {
        self.position(doc, node_id).is_ok()
    }

    pub fn contains_node(&self, node: &NodeProxy) -> bool {
        self.contains(node.doc_id(), node.node_id())
    }

    pub fn union(&self, other: &NodeSet) -> NodeSet {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let nodes = self
            .nodes
            .iter()
            .merge_join_by(other.nodes.iter(), |a, b| a.cmp(b))
            .map(|e| match e {
                EitherOrBoth::Left(a) => a.clone(),
                EitherOrBoth::Right(b) => b.clone(),
                EitherOrBoth::Both(a, b) => {
                    let mut n = a.clone();
                    n.merge_context(b);
                    n
                }
            })
            .collect();
        NodeSet { nodes }
    }

    pub fn intersection(&self, other: &NodeSet) -> NodeSet {
        if self.is_empty() || other.is_empty() {
            return NodeSet::new();
        }
        let nodes = self
            .nodes
            .iter()
            .merge_join_by(other.nodes.iter(), |a, b| a.cmp(b))
            .filter_map(|e| match e {
                EitherOrBoth::Both(a, b) => {
                    let mut n = a.clone();
                    n.merge_context(b);
                    Some(n)
                }
                _ => None,
            })
            .collect();
        NodeSet { nodes }
    }

    pub fn except(&self, other: &NodeSet) -> NodeSet {
        if self.is_empty() || other.is_empty() {
            return self.clone();
        }
        let nodes = self
            .nodes
            .iter()
            .merge_join_by(other.nodes.iter(), |a, b| a.cmp(b))
            .filter_map(|e| match e {
                EitherOrBoth::Left(a) => Some(a.clone()),
                _ => None,
            })
            .collect();
        NodeSet { nodes }
    }

    /// Members of this set that are ancestors of the given node, nearest
    /// first. With `direct_parent` only the parent is considered; with
    /// `include_self` the node itself is tried first.
    pub fn ancestors_in_set(
        &self,
        doc: DocId,
        node_id: &NodeId,
        direct_parent: bool,
        include_self: bool,
    ) -> Vec<&NodeProxy> {
        let mut found = Vec::new();
        if include_self && let Some(n) = self.get(doc, node_id) {
            found.push(n);
        }
        for ancestor in node_id.ancestors() {
            if let Some(n) = self.get(doc, &ancestor) {
                found.push(n);
            }
            if direct_parent {
                break;
            }
        }
        found
    }

    /// Nearest member of this set that is a parent (or ancestor) of the
    /// given node.
    pub fn parent_with_child(
        &self,
        doc: DocId,
        node_id: &NodeId,
        direct_parent: bool,
        include_self: bool,
    ) -> Option<&NodeProxy> {
        if include_self && let Some(n) = self.get(doc, node_id) {
            return Some(n);
        }
        for ancestor in node_id.ancestors() {
            if let Some(n) = self.get(doc, &ancestor) {
                return Some(n);
            }
            if direct_parent {
                break;
            }
        }
        None
    }

    /// Maps every node to the origins it recorded under `context_id`. Each
    /// returned origin carries a link to itself under the same id so it can
    /// be correlated again by an enclosing predicate.
    pub fn get_context_nodes(&self, context_id: ContextId) -> NodeSet {
        let ContextId::Scope(id) = context_id else {
            return NodeSet::new();
        };
        let mut out = Vec::new();
        for node in &self.nodes {
            for origin in node.context().origins(id) {
                let mut o = origin.clone();
                let this = origin.clone();
                o.add_context_node(id, &this);
                out.push(o);
            }
        }
        NodeSet::from_nodes(out)
    }

    pub fn get_parents(&self, context_id: ContextId) -> NodeSet {
        let mut out = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if let Some(mut parent) = node.parent() {
                attach_to_origin(&mut parent, node, context_id);
                out.push(parent);
            }
        }
        NodeSet::from_nodes(out)
    }

    pub fn get_ancestors(&self, context_id: ContextId, include_self: bool) -> NodeSet {
        let mut out = Vec::new();
        for node in &self.nodes {
            if include_self {
                let mut me = node.sibling_handle(node.node_id().clone());
                attach_to_origin(&mut me, node, context_id);
                out.push(me);
            }
            for ancestor in node.node_id().ancestors() {
                let mut a = node.sibling_handle(ancestor);
                attach_to_origin(&mut a, node, context_id);
                out.push(a);
            }
        }
        NodeSet::from_nodes(out)
    }

    /// Distinct documents of the set, in id order.
    pub fn documents(&self) -> Vec<Arc<Document>> {
        let mut docs: Vec<Arc<Document>> = Vec::new();
        for n in &self.nodes {
            if docs.last().is_none_or(|d| d.id() != n.doc_id()) {
                docs.push(n.doc().clone());
            }
        }
        docs
    }

    pub fn is_persistent(&self) -> bool {
        self.nodes.iter().all(NodeProxy::is_persistent)
    }
}

/// Records `from` as the origin of `node`: a link under a scoped id on top
/// of the origin's chain, otherwise the origin's own chain is shared.
fn attach_to_origin(node: &mut NodeProxy, from: &NodeProxy, context_id: ContextId) {
    match context_id {
        ContextId::Scope(id) => node.attach_scoped(id, from),
        ContextId::None => node.share_context(from),
    }
}

impl FromIterator<NodeProxy> for NodeSet {
    fn from_iter<T: IntoIterator<Item = NodeProxy>>(iter: T) -> Self {
        NodeSet::from_nodes(iter)
    }
}

impl<'a> IntoIterator for &'a NodeSet {
    type Item = &'a NodeProxy;
    type IntoIter = std::slice::Iter<'a, NodeProxy>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprId;
    use crate::store::{Store, elem};

    fn fixture() -> (Arc<Document>, Vec<NodeProxy>) {
        let store = Store::new();
        let doc = store.add_document(
            "t.xml",
            elem("r")
                .child(elem("a").child(elem("b")))
                .child(elem("a").child(elem("b"))),
        );
        let ids: [&[u32]; 5] = [&[1], &[1, 1], &[1, 1, 1], &[1, 2], &[1, 2, 1]];
        let nodes = ids
            .iter()
            .map(|l| NodeProxy::new(doc.clone(), NodeId::from_levels(l)))
            .collect();
        (doc, nodes)
    }

    #[test]
    fn algebra_keeps_document_order() {
        let (_, n) = fixture();
        let l = NodeSet::from_nodes(vec![n[3].clone(), n[1].clone(), n[0].clone()]);
        let r = NodeSet::from_nodes(vec![n[1].clone(), n[4].clone()]);
        let u: Vec<_> = l.union(&r).iter().map(|x| x.node_id().to_string()).collect();
        assert_eq!(u, vec!["1", "1.1", "1.2", "1.2.1"]);
        assert_eq!(l.intersection(&r).len(), 1);
        let e: Vec<_> = l.except(&r).iter().map(|x| x.node_id().to_string()).collect();
        assert_eq!(e, vec!["1", "1.2"]);
    }

    #[test]
    fn parent_with_child_finds_nearest() {
        let (doc, n) = fixture();
        let set = NodeSet::from_nodes(vec![n[0].clone(), n[1].clone()]);
        let b = NodeId::from_levels(&[1, 1, 1]);
        assert_eq!(set.parent_with_child(doc.id(), &b, true, false), Some(&n[1]));
        let b2 = NodeId::from_levels(&[1, 2, 1]);
        assert_eq!(set.parent_with_child(doc.id(), &b2, true, false), None);
        assert_eq!(set.parent_with_child(doc.id(), &b2, false, false), Some(&n[0]));
        assert_eq!(set.ancestors_in_set(doc.id(), &b, false, false).len(), 2);
    }

    #[test]
    fn context_nodes_follow_correlation_links() {
        let (_, n) = fixture();
        let scope = ExprId::new(7);
        let mut b = n[2].clone();
        b.add_context_node(scope, &n[1]);
        let set = NodeSet::single(b);
        let ctx = set.get_context_nodes(ContextId::Scope(scope));
        assert_eq!(ctx.as_slice(), &[n[1].clone()]);
        assert!(ctx.as_slice()[0].context().contains(scope, &n[1]));
        assert!(set.get_context_nodes(ContextId::None).is_empty());
    }

    #[test]
    fn scoped_parents_keep_outer_links() {
        let (_, n) = fixture();
        let outer = ExprId::new(3);
        let inner = ExprId::new(9);
        let mut b = n[2].clone();
        b.add_context_node(outer, &n[0]);
        let set = NodeSet::single(b.clone());

        let parents = set.get_parents(ContextId::Scope(inner));
        let parent = &parents.as_slice()[0];
        assert_eq!(parent, &n[1]);
        assert!(parent.context().contains(inner, &b));
        assert!(parent.context().contains(outer, &n[0]));

        let ancestors = set.get_ancestors(ContextId::Scope(inner), false);
        // b's parent, r and the document node
        assert_eq!(ancestors.len(), 3);
        assert!(ancestors.iter().all(|a| a.context().contains(outer, &n[0])));
    }

    #[test]
    fn parents_carry_origin() {
        let (_, n) = fixture();
        let scope = ExprId::new(3);
        let set = NodeSet::from_nodes(vec![n[2].clone(), n[4].clone()]);
        let parents = set.get_parents(ContextId::Scope(scope));
        assert_eq!(parents.len(), 2);
        assert!(parents.as_slice()[0].context().contains(scope, &n[2]));
        let ancestors = set.get_ancestors(ContextId::None, false);
        // r, both a's and the document node
        assert_eq!(ancestors.len(), 4);
    }
}
