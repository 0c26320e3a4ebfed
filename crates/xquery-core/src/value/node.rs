use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::expr::ExprId;
use crate::store::{DocId, Document, NodeId, NodeKind};

struct ContextLink {
    context_id: ExprId,
    origin: NodeProxy,
    next: Option<Arc<ContextLink>>,
}

/// Correlation links of a node: pairs of (correlation id, origin node)
/// recording which context node produced it inside a predicate or clause
/// scope. The chain is persistent, so sharing it between nodes is a cheap
/// clone and adding a link never affects other holders.
#[derive(Clone, Default)]
pub struct ContextChain {
    head: Option<Arc<ContextLink>>,
}

impl ContextChain {
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn iter(&self) -> ContextIter<'_> {
        ContextIter {
            cur: self.head.as_deref(),
        }
    }

    pub fn contains(&self, id: ExprId, origin: &NodeProxy) -> bool {
        self.iter().any(|(cid, o)| cid == id && o == origin)
    }

    /// Origins recorded under the given correlation id.
    pub fn origins(&self, id: ExprId) -> impl Iterator<Item = &NodeProxy> + '_ {
        self.iter()
            .filter(move |(cid, _)| *cid == id)
            .map(|(_, o)| o)
    }

    /// Chain with a new head link. Duplicate (id, origin) pairs are ignored.
    pub fn with_link(&self, id: ExprId, origin: NodeProxy) -> ContextChain {
        if self.contains(id, &origin) {
            return self.clone();
        }
        ContextChain {
            head: Some(Arc::new(ContextLink {
                context_id: id,
                origin,
                next: self.head.clone(),
            })),
        }
    }

    /// Copies every link into freshly allocated storage.
    pub fn deep_copy(&self) -> ContextChain {
        let links: Vec<(ExprId, NodeProxy)> =
            self.iter().map(|(id, o)| (id, o.clone())).collect();
        let mut head = None;
        for (context_id, origin) in links.into_iter().rev() {
            head = Some(Arc::new(ContextLink {
                context_id,
                origin,
                next: head,
            }));
        }
        ContextChain { head }
    }

    pub fn merged(&self, other: &ContextChain) -> ContextChain {
        if self.is_empty() {
            return other.clone();
        }
        let mut out = self.clone();
        for (id, origin) in other.iter() {
            out = out.with_link(id, origin.clone());
        }
        out
    }
}

impl fmt::Debug for ContextChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|(id, o)| format!("{id}->{}:{}", o.doc_id(), o.node_id())))
            .finish()
    }
}

pub struct ContextIter<'a> {
    cur: Option<&'a ContextLink>,
}

impl<'a> Iterator for ContextIter<'a> {
    type Item = (ExprId, &'a NodeProxy);

    fn next(&mut self) -> Option<Self::Item> {
        let link = self.cur?;
        self.cur = link.next.as_deref();
        Some((link.context_id, &link.origin))
    }
}

/// Handle to a stored node. Identity and ordering are those of the
/// (document, node id) pair; the correlation chain rides along but never
/// takes part in comparisons.
#[derive(Clone)]
pub struct NodeProxy {
    doc: Arc<Document>,
    node_id: NodeId,
    context: ContextChain,
}

impl NodeProxy {
    pub fn new(doc: Arc<Document>, node_id: NodeId) -> Self {
        Self {
            doc,
            node_id,
            context: ContextChain::default(),
        }
    }

    pub fn document_node(doc: Arc<Document>) -> Self {
        Self::new(doc, NodeId::document())
    }

    pub fn doc(&self) -> &Arc<Document> {
        &self.doc
    }

    pub fn doc_id(&self) -> DocId {
        self.doc.id()
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn kind(&self) -> NodeKind {
        self.doc.kind(&self.node_id).unwrap_or(NodeKind::Document)
    }

    pub fn name(&self) -> Option<&str> {
        self.doc.name(&self.node_id).map(|a| &**a)
    }

    pub fn string_value(&self) -> String {
        self.doc.string_value(&self.node_id)
    }

    pub fn is_persistent(&self) -> bool {
        !self.doc.is_temporary()
    }

    pub fn context(&self) -> &ContextChain {
        &self.context
    }

    pub fn add_context_node(&mut self, id: ExprId, origin: &NodeProxy) {
        self.context = self.context.with_link(id, origin.clone());
    }

    /// Shallow copy: share the other node's chain.
    pub fn share_context(&mut self, from: &NodeProxy) {
        self.context = from.context.clone();
    }

    pub fn deep_copy_context(&mut self, from: &NodeProxy) {
        self.context = from.context.deep_copy();
    }

    /// Records `origin` under a scoped correlation id, carrying the origin's
    /// own links along. The first origin's chain is copied, later ones are
    /// merged in.
    pub fn attach_scoped(&mut self, id: ExprId, origin: &NodeProxy) {
        if self.context.is_empty() {
            self.deep_copy_context(origin);
        } else {
            self.merge_context(origin);
        }
        self.add_context_node(id, origin);
    }

    pub fn merge_context(&mut self, from: &NodeProxy) {
        if !from.context.is_empty() {
            self.context = self.context.merged(&from.context);
        }
    }

    /// Another node of the same document, without correlation links.
    pub fn sibling_handle(&self, node_id: NodeId) -> NodeProxy {
        NodeProxy::new(self.doc.clone(), node_id)
    }

    pub fn parent(&self) -> Option<NodeProxy> {
        self.node_id.parent().map(|p| self.sibling_handle(p))
    }

    pub fn root(&self) -> NodeProxy {
        NodeProxy::document_node(self.doc.clone())
    }
}

impl PartialEq for NodeProxy {
    fn eq(&self, other: &Self) -> bool {
        self.doc_id() == other.doc_id() && self.node_id == other.node_id
    }
}

impl Eq for NodeProxy {}

impl Hash for NodeProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.doc_id().hash(state);
        self.node_id.hash(state);
    }
}

impl PartialOrd for NodeProxy {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeProxy {
    fn cmp(&self, other: &Self) -> Ordering {
        self.doc_id()
            .cmp(&other.doc_id())
            .then_with(|| self.node_id.cmp(&other.node_id))
    }
}

impl fmt::Debug for NodeProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeProxy({}:{})", self.doc_id(), self.node_id)
    }
}
