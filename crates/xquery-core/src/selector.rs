//! Node selectors: the axis semantics applied to candidate nodes coming
//! from an index lookup or a document scan.
use std::sync::Arc;

use crate::context::ContextId;
use crate::store::{Document, NodeId};
use crate::value::{NodeProxy, NodeSet};

/// Decides whether a candidate node is reachable from a context set along
/// one axis. A match is returned as a proxy carrying the correlation links
/// of the context node(s) it was reached from.
pub trait NodeSelector {
    fn match_node(&self, doc: &Arc<Document>, node_id: &NodeId) -> Option<NodeProxy>;
}

/// Builds the proxy for `node_id` and attaches it to each governing
/// context node.
fn correlate<'a>(
    doc: &Arc<Document>,
    node_id: &NodeId,
    origins: impl IntoIterator<Item = &'a NodeProxy>,
    context_id: ContextId,
) -> Option<NodeProxy> {
    let mut origins = origins.into_iter().peekable();
    origins.peek()?;
    let mut node = NodeProxy::new(doc.clone(), node_id.clone());
    for origin in origins {
        match context_id {
            ContextId::Scope(id) => node.attach_scoped(id, origin),
            ContextId::None => {
                if node.context().is_empty() {
                    node.share_context(origin);
                } else {
                    node.merge_context(origin);
                }
            }
        }
    }
    Some(node)
}

pub struct ChildSelector<'a> {
    context: &'a NodeSet,
    context_id: ContextId,
}

impl<'a> ChildSelector<'a> {
    pub fn new(context: &'a NodeSet, context_id: ContextId) -> Self {
        Self {
            context,
            context_id,
        }
    }
}

impl NodeSelector for ChildSelector<'_> {
    fn match_node(&self, doc: &Arc<Document>, node_id: &NodeId) -> Option<NodeProxy> {
        let parents = self.context.ancestors_in_set(doc.id(), node_id, true, false);
        correlate(doc, node_id, parents, self.context_id)
    }
}

pub struct DescendantSelector<'a> {
    context: &'a NodeSet,
    context_id: ContextId,
    include_self: bool,
}

impl<'a> DescendantSelector<'a> {
    pub fn new(context: &'a NodeSet, context_id: ContextId) -> Self {
        Self {
            context,
            context_id,
            include_self: false,
        }
    }
}

impl NodeSelector for DescendantSelector<'_> {
    fn match_node(&self, doc: &Arc<Document>, node_id: &NodeId) -> Option<NodeProxy> {
        let ancestors = self
            .context
            .ancestors_in_set(doc.id(), node_id, false, self.include_self);
        correlate(doc, node_id, ancestors, self.context_id)
    }
}

pub struct DescendantOrSelfSelector<'a>(DescendantSelector<'a>);

impl<'a> DescendantOrSelfSelector<'a> {
    pub fn new(context: &'a NodeSet, context_id: ContextId) -> Self {
        Self(DescendantSelector {
            context,
            context_id,
            include_self: true,
        })
    }
}

impl NodeSelector for DescendantOrSelfSelector<'_> {
    fn match_node(&self, doc: &Arc<Document>, node_id: &NodeId) -> Option<NodeProxy> {
        self.0.match_node(doc, node_id)
    }
}

pub struct SelfSelector<'a> {
    context: &'a NodeSet,
    context_id: ContextId,
}

impl<'a> SelfSelector<'a> {
    pub fn new(context: &'a NodeSet, context_id: ContextId) -> Self {
        Self {
            context,
            context_id,
        }
    }
}

impl NodeSelector for SelfSelector<'_> {
    fn match_node(&self, doc: &Arc<Document>, node_id: &NodeId) -> Option<NodeProxy> {
        let this = self.context.get(doc.id(), node_id);
        correlate(doc, node_id, this, self.context_id)
    }
}

/// Parents of the context set, computed once up front.
pub struct ParentSelector {
    parents: NodeSet,
}

impl ParentSelector {
    pub fn new(context: &NodeSet, context_id: ContextId) -> Self {
        Self {
            parents: context.get_parents(context_id),
        }
    }
}

impl NodeSelector for ParentSelector {
    fn match_node(&self, doc: &Arc<Document>, node_id: &NodeId) -> Option<NodeProxy> {
        self.parents.get(doc.id(), node_id).cloned()
    }
}

pub struct AncestorSelector {
    ancestors: NodeSet,
}

impl AncestorSelector {
    pub fn new(context: &NodeSet, context_id: ContextId, include_self: bool) -> Self {
        Self {
            ancestors: context.get_ancestors(context_id, include_self),
        }
    }
}

impl NodeSelector for AncestorSelector {
    fn match_node(&self, doc: &Arc<Document>, node_id: &NodeId) -> Option<NodeProxy> {
        self.ancestors.get(doc.id(), node_id).cloned()
    }
}

/// Runs every candidate through `selector`, producing a node set in
/// document order.
pub fn select<'c, S, I>(selector: &S, doc: &Arc<Document>, candidates: I) -> Vec<NodeProxy>
where
    S: NodeSelector + ?Sized,
    I: IntoIterator<Item = &'c NodeId>,
{
    candidates
        .into_iter()
        .filter_map(|id| selector.match_node(doc, id))
        .collect()
}
