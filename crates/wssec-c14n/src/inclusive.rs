#![forbid(unsafe_code)]

//! Canonical XML 1.0 (inclusive C14N).
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! Every in-scope namespace that differs from what the nearest rendered
//! ancestor already declared is output. When canonicalizing a document
//! subset, the apex element also picks up `xml:*` attributes inherited
//! from its ancestors.

use crate::escape;
use crate::render::{self, Attr, NsDecl};
use std::collections::BTreeMap;
use wssec_core::{ns, Error};
use wssec_xml::{Document, NodeId, NodeKind, NodeSet};

/// Canonicalize the subtree at `start` using Canonical XML 1.0.
pub fn canonicalize(
    doc: &Document,
    start: NodeId,
    with_comments: bool,
    node_set: Option<&NodeSet>,
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    let ctx = C14nContext {
        doc,
        with_comments,
        node_set,
    };
    ctx.process_node(start, &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct C14nContext<'a> {
    doc: &'a Document,
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
}

impl C14nContext<'_> {
    fn is_visible(&self, id: NodeId) -> bool {
        self.node_set.map_or(true, |ns| ns.contains(id))
    }

    fn process_node(
        &self,
        id: NodeId,
        output: &mut Vec<u8>,
        inherited_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        match self.doc.kind(id) {
            NodeKind::Document => {
                for child in self.doc.children(id) {
                    self.process_node(child, output, inherited_ns)?;
                }
            }
            NodeKind::Element(_) => self.process_element(id, output, inherited_ns)?,
            NodeKind::Text(text) => {
                if self.is_visible(id) {
                    escape::text(output, text);
                }
            }
            NodeKind::Comment(_) => {
                if self.with_comments && self.is_visible(id) {
                    render::render_misc(self.doc, id, output);
                }
            }
            NodeKind::ProcessingInstruction { .. } => {
                if self.is_visible(id) {
                    render::render_misc(self.doc, id, output);
                }
            }
        }
        Ok(())
    }

    fn process_element(
        &self,
        id: NodeId,
        output: &mut Vec<u8>,
        inherited_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if !self.is_visible(id) {
            for child in self.doc.children(id) {
                self.process_node(child, output, inherited_ns)?;
            }
            return Ok(());
        }
        let el = self
            .doc
            .element(id)
            .ok_or_else(|| Error::Canonicalization("expected an element".into()))?;

        let current_ns = self.doc.in_scope_namespaces(id);
        let mut ns_decls: Vec<NsDecl> = current_ns
            .iter()
            .filter(|(prefix, uri)| inherited_ns.get(*prefix) != Some(*uri))
            .map(|(prefix, uri)| NsDecl {
                prefix: prefix.clone(),
                uri: uri.clone(),
            })
            .collect();
        if inherited_ns.get("").is_some_and(|u| !u.is_empty()) && !current_ns.contains_key("") {
            ns_decls.push(NsDecl {
                prefix: String::new(),
                uri: String::new(),
            });
        }
        ns_decls.sort();

        let mut attrs = Attr::collect(self.doc, id);
        let parent_rendered = self
            .doc
            .parent(id)
            .is_some_and(|p| self.doc.is_element(p) && self.is_visible(p));
        if self.node_set.is_some() && !parent_rendered {
            let extra = self.inherited_xml_attrs(id, &attrs);
            attrs.extend(extra);
            attrs.sort();
        }

        let elem_name = el.name.qualified();
        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for ns_decl in &ns_decls {
            ns_decl.write(output);
        }
        for attr in &attrs {
            attr.write(output);
        }
        output.push(b'>');

        let mut child_ns = current_ns;
        if !child_ns.contains_key("") {
            child_ns.insert(String::new(), String::new());
        }
        for child in self.doc.children(id) {
            self.process_node(child, output, &child_ns)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }

    /// `xml:*` attributes declared on ancestors and not overridden on `id`.
    fn inherited_xml_attrs(&self, id: NodeId, existing: &[Attr]) -> Vec<Attr> {
        let mut inherited: BTreeMap<String, String> = BTreeMap::new();
        let mut current = self.doc.parent(id);
        while let Some(ancestor) = current {
            if let Some(el) = self.doc.element(ancestor) {
                for attr in &el.attributes {
                    if attr.name.namespace == ns::XML {
                        inherited
                            .entry(attr.name.local.clone())
                            .or_insert_with(|| attr.value.clone());
                    }
                }
            }
            current = self.doc.parent(ancestor);
        }
        inherited
            .into_iter()
            .filter(|(name, _)| {
                !existing
                    .iter()
                    .any(|a| a.ns_uri == ns::XML && a.local_name == *name)
            })
            .map(|(name, value)| Attr {
                ns_uri: ns::XML.to_owned(),
                qualified_name: format!("xml:{name}"),
                local_name: name,
                value,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c14n(xml: &str) -> String {
        let doc = Document::parse(xml).unwrap();
        String::from_utf8(canonicalize(&doc, doc.root(), false, None).unwrap()).unwrap()
    }

    #[test]
    fn test_simple_c14n() {
        assert_eq!(
            c14n(r#"<root><a b="1" a="2"/></root>"#),
            r#"<root><a a="2" b="1"></a></root>"#
        );
    }

    #[test]
    fn test_namespace_rendering() {
        assert_eq!(
            c14n(r#"<root xmlns:a="http://a" xmlns:b="http://b"><a:child/></root>"#),
            r#"<root xmlns:a="http://a" xmlns:b="http://b"><a:child></a:child></root>"#
        );
    }

    #[test]
    fn default_namespace_undeclaration() {
        assert_eq!(
            c14n(r#"<a xmlns="urn:x"><b xmlns=""/></a>"#),
            r#"<a xmlns="urn:x"><b xmlns=""></b></a>"#
        );
    }

    #[test]
    fn subset_apex_gets_ancestor_namespaces_and_xml_attrs() {
        let xml = r#"<s:Envelope xmlns:s="urn:s" xml:lang="en"><s:Body><p>x</p></s:Body></s:Envelope>"#;
        let doc = Document::parse(xml).unwrap();
        let env = doc.document_element().unwrap();
        let body = doc.first_child(env).unwrap();
        let set = NodeSet::tree_without_comments(body, &doc);
        let out = canonicalize(&doc, doc.root(), false, Some(&set)).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<s:Body xmlns:s="urn:s" xml:lang="en"><p>x</p></s:Body>"#
        );
    }
}
