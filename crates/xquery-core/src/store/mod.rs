//! In-memory node store: documents, structural index and update
//! notification.
mod document;
mod index;
mod node_id;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

pub use document::{
    DocId, Document, ElementBuilder, NodeKind, NodeSpec, StoredNode, comment, elem, pi, text,
};
pub use index::StructuralIndex;
pub use node_id::NodeId;

/// Receives a callback whenever a stored document is replaced.
pub trait UpdateListener: Send + Sync {
    fn document_updated(&self, doc: DocId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registry of stored documents.
///
/// Documents are immutable; an update replaces the whole document under the
/// same id and notifies every subscribed [`UpdateListener`].
pub struct Store {
    documents: RwLock<BTreeMap<DocId, Arc<Document>>>,
    next_doc_id: AtomicU32,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn UpdateListener>)>>,
    next_listener_id: AtomicU64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("documents", &self.documents().len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
            next_doc_id: AtomicU32::new(1),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    fn allocate_doc_id(&self) -> DocId {
        DocId(self.next_doc_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn add_document(&self, uri: &str, root: impl Into<NodeSpec>) -> Arc<Document> {
        self.add_document_with(uri, vec![root.into()])
    }

    pub fn add_document_with(&self, uri: &str, roots: Vec<NodeSpec>) -> Arc<Document> {
        let doc = Arc::new(Document::build(self.allocate_doc_id(), uri.to_string(), false, roots));
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(doc.id(), doc.clone());
        tracing::debug!(doc = %doc.id(), uri, nodes = doc.len(), "document stored");
        doc
    }

    /// Builds a document for constructed nodes. It receives a fresh id but
    /// is not registered.
    pub fn create_temporary(&self, roots: Vec<NodeSpec>) -> Arc<Document> {
        Arc::new(Document::build(self.allocate_doc_id(), String::new(), true, roots))
    }

    /// Replaces the content of a stored document and notifies listeners.
    /// Returns `None` if no document with that id is stored.
    pub fn replace_document(&self, id: DocId, root: impl Into<NodeSpec>) -> Option<Arc<Document>> {
        let doc = {
            let mut docs = self.documents.write().unwrap_or_else(PoisonError::into_inner);
            let old = docs.get(&id)?;
            let uri = old.uri().to_string();
            let doc = Arc::new(Document::build(id, uri, false, vec![root.into()]));
            docs.insert(id, doc.clone());
            doc
        };
        let listeners: Vec<Arc<dyn UpdateListener>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        tracing::debug!(doc = %id, listeners = listeners.len(), "document replaced");
        for listener in listeners {
            listener.document_updated(id);
        }
        Some(doc)
    }

    pub fn document(&self, id: DocId) -> Option<Arc<Document>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn document_by_uri(&self, uri: &str) -> Option<Arc<Document>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|d| d.uri() == uri)
            .cloned()
    }

    pub fn documents(&self) -> Vec<Arc<Document>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn subscribe(&self, listener: Arc<dyn UpdateListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter(AtomicUsize);

    impl UpdateListener for Counter {
        fn document_updated(&self, _doc: DocId) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn replace_notifies_until_unsubscribed() {
        let store = Store::new();
        let doc = store.add_document("a.xml", elem("a"));
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let id = store.subscribe(counter.clone());
        assert!(store.replace_document(doc.id(), elem("b")).is_some());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.replace_document(doc.id(), elem("c"));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn temporary_documents_are_not_registered() {
        let store = Store::new();
        let tmp = store.create_temporary(vec![comment("x")]);
        assert!(tmp.is_temporary());
        assert!(store.document(tmp.id()).is_none());
    }

    #[test]
    fn index_lists_names_in_document_order() {
        let store = Store::new();
        let doc = store.add_document(
            "i.xml",
            elem("r").child(elem("b")).child(elem("c").child(elem("b").attr("k", "v"))),
        );
        let bs: Vec<String> = doc.index().elements("b").iter().map(ToString::to_string).collect();
        assert_eq!(bs, vec!["1.1", "1.2.1"]);
        assert_eq!(doc.index().attributes("k").len(), 1);
        assert!(doc.index().elements("zzz").is_empty());
    }
}
