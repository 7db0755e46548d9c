#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! Only "visibly utilized" namespace declarations are output. A namespace
//! is visibly utilized if:
//! 1. Its prefix is used by the element's tag name, OR
//! 2. Its prefix is used by one of the element's attributes, OR
//! 3. The prefix appears in the InclusiveNamespaces PrefixList.

use crate::escape;
use crate::render::{self, Attr, NsDecl};
use std::collections::{BTreeMap, HashSet};
use wssec_core::Error;
use wssec_xml::{Document, NodeId, NodeKind, NodeSet};

/// Canonicalize the subtree at `start` using Exclusive C14N 1.0.
pub fn canonicalize(
    doc: &Document,
    start: NodeId,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let mut output = Vec::new();
    let ctx = ExcC14nContext {
        doc,
        with_comments,
        node_set,
        inclusive_prefixes: inclusive_prefixes.iter().cloned().collect(),
    };
    ctx.process_node(start, &mut output, &BTreeMap::new())?;
    Ok(output)
}

struct ExcC14nContext<'a> {
    doc: &'a Document,
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: HashSet<String>,
}

impl ExcC14nContext<'_> {
    fn is_visible(&self, id: NodeId) -> bool {
        self.node_set.map_or(true, |ns| ns.contains(id))
    }

    fn process_node(
        &self,
        id: NodeId,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        match self.doc.kind(id) {
            NodeKind::Document => {
                for child in self.doc.children(id) {
                    self.process_node(child, output, rendered_ns)?;
                }
            }
            NodeKind::Element(_) => self.process_element(id, output, rendered_ns)?,
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
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if !self.is_visible(id) {
            for child in self.doc.children(id) {
                self.process_node(child, output, rendered_ns)?;
            }
            return Ok(());
        }
        let el = self
            .doc
            .element(id)
            .ok_or_else(|| Error::Canonicalization("expected an element".into()))?;

        let mut utilized: HashSet<String> = HashSet::new();
        utilized.insert(el.name.prefix.clone());
        for attr in &el.attributes {
            if !attr.name.prefix.is_empty() {
                utilized.insert(attr.name.prefix.clone());
            }
        }
        for p in &self.inclusive_prefixes {
            if p == "#default" {
                utilized.insert(String::new());
            } else {
                utilized.insert(p.clone());
            }
        }

        let inscope = self.doc.in_scope_namespaces(id);
        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for prefix in &utilized {
            if prefix == "xml" {
                continue;
            }
            if let Some(uri) = inscope.get(prefix) {
                if rendered_ns.get(prefix) != Some(uri) {
                    ns_decls.push(NsDecl {
                        prefix: prefix.clone(),
                        uri: uri.clone(),
                    });
                }
            } else if prefix.is_empty() && rendered_ns.get("").is_some_and(|u| !u.is_empty()) {
                ns_decls.push(NsDecl {
                    prefix: String::new(),
                    uri: String::new(),
                });
            }
        }
        ns_decls.sort();

        let attrs = Attr::collect(self.doc, id);
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

        let mut child_rendered_ns = rendered_ns.clone();
        for ns_decl in &ns_decls {
            child_rendered_ns.insert(ns_decl.prefix.clone(), ns_decl.uri.clone());
        }
        for child in self.doc.children(id) {
            self.process_node(child, output, &child_rendered_ns)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exc(xml: &str, local: &str, prefixes: &[String]) -> String {
        let doc = Document::parse(xml).unwrap();
        let target = doc
            .descendants(doc.root())
            .find(|&n| doc.local_name(n) == local)
            .unwrap();
        let set = NodeSet::tree_without_comments(target, &doc);
        String::from_utf8(canonicalize(&doc, doc.root(), false, Some(&set), prefixes).unwrap())
            .unwrap()
    }

    #[test]
    fn only_utilized_namespaces_are_rendered() {
        let xml = r#"<s:Envelope xmlns:s="urn:s" xmlns:u="urn:u" xmlns:x="urn:x"><s:Body u:Id="b"><x:Op/></s:Body></s:Envelope>"#;
        assert_eq!(
            exc(xml, "Body", &[]),
            r#"<s:Body xmlns:s="urn:s" xmlns:u="urn:u" u:Id="b"><x:Op xmlns:x="urn:x"></x:Op></s:Body>"#
        );
    }

    #[test]
    fn inclusive_prefix_list_forces_declaration() {
        let xml = r#"<s:Envelope xmlns:s="urn:s" xmlns:x="urn:x"><s:Body/></s:Envelope>"#;
        assert_eq!(
            exc(xml, "Body", &["x".to_owned()]),
            r#"<s:Body xmlns:s="urn:s" xmlns:x="urn:x"></s:Body>"#
        );
    }

    #[test]
    fn detached_subtree_uses_own_binding() {
        let xml = r#"<s:Envelope xmlns:s="urn:s"><s:Header><s:Item>v</s:Item></s:Header></s:Envelope>"#;
        let mut doc = Document::parse(xml).unwrap();
        let env = doc.document_element().unwrap();
        let header = doc.first_child(env).unwrap();
        doc.detach(header);
        let out = canonicalize(&doc, header, false, None, &[]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<s:Header xmlns:s="urn:s"><s:Item>v</s:Item></s:Header>"#
        );
    }
}
