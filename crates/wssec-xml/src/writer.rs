#![forbid(unsafe_code)]

//! Plain (non-canonical) serialization of arena documents.

use crate::document::{Document, NodeId, NodeKind};

pub(crate) fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
    out
}

/// Append the serialization of `id` and its subtree to `out`.
///
/// Namespace declarations are written exactly as recorded on each element;
/// no declarations are synthesized for detached subtrees.
pub(crate) fn write_node(doc: &Document, id: NodeId, out: &mut String) {
    match doc.kind(id) {
        NodeKind::Document => {
            for child in doc.children(id) {
                write_node(doc, child, out);
            }
        }
        NodeKind::Element(el) => {
            let qname = el.name.qualified();
            out.push('<');
            out.push_str(&qname);
            for (prefix, uri) in &el.namespaces {
                if prefix.is_empty() {
                    out.push_str(" xmlns=\"");
                } else {
                    out.push_str(" xmlns:");
                    out.push_str(prefix);
                    out.push_str("=\"");
                }
                out.push_str(&escape_attr(uri));
                out.push('"');
            }
            for attr in &el.attributes {
                out.push(' ');
                out.push_str(&attr.name.qualified());
                out.push_str("=\"");
                out.push_str(&escape_attr(&attr.value));
                out.push('"');
            }
            if doc.first_child(id).is_none() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in doc.children(id) {
                write_node(doc, child, out);
            }
            out.push_str("</");
            out.push_str(&qname);
            out.push('>');
        }
        NodeKind::Text(t) => out.push_str(&escape_text(t)),
        NodeKind::Comment(c) => {
            out.push_str("<!--");
            out.push_str(c);
            out.push_str("-->");
        }
        NodeKind::ProcessingInstruction { target, data } => {
            out.push_str("<?");
            out.push_str(target);
            if !data.is_empty() {
                out.push(' ');
                out.push_str(data);
            }
            out.push_str("?>");
        }
    }
}
