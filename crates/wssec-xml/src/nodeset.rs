#![forbid(unsafe_code)]

//! NodeSet type for canonicalization and reference transforms.
//!
//! A `NodeSet` is the set of document nodes selected by a signature
//! reference. The enveloped-signature transform subtracts the signature's
//! subtree; canonicalization renders only the nodes in the set.

use std::collections::HashSet;

use crate::document::{Document, NodeId, NodeKind};

#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: HashSet<NodeId>,
}

impl NodeSet {
    /// Create an empty node set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node of the document.
    pub fn all(doc: &Document) -> Self {
        Self::tree_with_comments(doc.root(), doc)
    }

    /// Every node of the document except comments.
    /// `URI=""` selects the document this way.
    pub fn all_without_comments(doc: &Document) -> Self {
        Self::tree_without_comments(doc.root(), doc)
    }

    /// The subtree rooted at `root`, without comments.
    /// `URI="#id"` selects an element this way.
    pub fn tree_without_comments(root: NodeId, doc: &Document) -> Self {
        Self::collect(root, doc, false)
    }

    /// The subtree rooted at `root`, comments included.
    pub fn tree_with_comments(root: NodeId, doc: &Document) -> Self {
        Self::collect(root, doc, true)
    }

    fn collect(root: NodeId, doc: &Document, include_comments: bool) -> Self {
        let nodes = std::iter::once(root)
            .chain(doc.descendants(root))
            .filter(|&n| include_comments || !matches!(doc.kind(n), NodeKind::Comment(_)))
            .collect();
        Self { nodes }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn insert(&mut self, id: NodeId) {
        self.nodes.insert(id);
    }

    /// Remove `root` and everything below it.
    pub fn remove_subtree(&mut self, root: NodeId, doc: &Document) {
        self.nodes.remove(&root);
        for d in doc.descendants(root) {
            self.nodes.remove(&d);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtree_without_comments() {
        let doc = Document::parse("<a><!--c--><b><c/></b></a>").unwrap();
        let a = doc.document_element().unwrap();
        let set = NodeSet::tree_without_comments(a, &doc);
        assert_eq!(set.len(), 3);
        let all = NodeSet::all(&doc);
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn remove_subtree_drops_descendants() {
        let doc = Document::parse("<a><b><c/></b><d/></a>").unwrap();
        let a = doc.document_element().unwrap();
        let b = doc.first_child(a).unwrap();
        let mut set = NodeSet::tree_without_comments(a, &doc);
        set.remove_subtree(b, &doc);
        assert!(set.contains(a));
        assert!(!set.contains(b));
        assert_eq!(set.len(), 2);
    }
}
