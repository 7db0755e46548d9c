#![forbid(unsafe_code)]

//! Pieces of canonical output shared by the inclusive and exclusive
//! serializers.

use std::cmp::Ordering;

use crate::escape;
use wssec_xml::{Document, NodeId, NodeKind};

/// A namespace declaration in an output start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// "" for the default namespace.
    pub prefix: String,
    pub uri: String,
}

impl NsDecl {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b" xmlns");
        if !self.prefix.is_empty() {
            out.push(b':');
            out.extend_from_slice(self.prefix.as_bytes());
        }
        out.extend_from_slice(b"=\"");
        escape::attr(out, &self.uri);
        out.push(b'"');
    }

    fn sort_key(&self) -> (bool, &str) {
        (!self.prefix.is_empty(), &self.prefix)
    }
}

/// The default namespace sorts first, then by prefix.
impl Ord for NsDecl {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute in an output start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// "" for an unqualified attribute.
    pub ns_uri: String,
    pub local_name: String,
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(b' ');
        out.extend_from_slice(self.qualified_name.as_bytes());
        out.extend_from_slice(b"=\"");
        escape::attr(out, &self.value);
        out.push(b'"');
    }

    /// Attributes of element `id`, sorted in canonical order.
    pub fn collect(doc: &Document, id: NodeId) -> Vec<Attr> {
        let Some(el) = doc.element(id) else {
            return Vec::new();
        };
        let mut attrs: Vec<Attr> = el
            .attributes
            .iter()
            .map(|a| Attr {
                ns_uri: a.name.namespace.clone(),
                local_name: a.name.local.clone(),
                qualified_name: a.name.qualified(),
                value: a.value.clone(),
            })
            .collect();
        attrs.sort();
        attrs
    }

    fn sort_key(&self) -> (bool, &str, &str) {
        (!self.ns_uri.is_empty(), &self.ns_uri, &self.local_name)
    }
}

/// Unqualified attributes first by local name, then by namespace URI and
/// local name.
impl Ord for Attr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Render a comment or processing instruction. Top-level ones get the
/// line breaks C14N puts between them and the document element.
pub fn render_misc(doc: &Document, id: NodeId, output: &mut Vec<u8>) {
    let top_level = doc
        .parent(id)
        .is_some_and(|p| matches!(doc.kind(p), NodeKind::Document));
    if top_level && has_preceding_element(doc, id) {
        output.push(b'\n');
    }
    match doc.kind(id) {
        NodeKind::Comment(text) => {
            output.extend_from_slice(b"<!--");
            output.extend_from_slice(text.as_bytes());
            output.extend_from_slice(b"-->");
        }
        NodeKind::ProcessingInstruction { target, data } => {
            output.extend_from_slice(b"<?");
            output.extend_from_slice(target.as_bytes());
            if !data.is_empty() {
                output.push(b' ');
                escape::pi(output, data);
            }
            output.extend_from_slice(b"?>");
        }
        _ => return,
    }
    if top_level && has_following_element(doc, id) {
        output.push(b'\n');
    }
}

fn has_preceding_element(doc: &Document, id: NodeId) -> bool {
    std::iter::successors(doc.prev_sibling(id), |&s| doc.prev_sibling(s))
        .any(|s| doc.is_element(s))
}

fn has_following_element(doc: &Document, id: NodeId) -> bool {
    std::iter::successors(doc.next_sibling(id), |&s| doc.next_sibling(s))
        .any(|s| doc.is_element(s))
}
