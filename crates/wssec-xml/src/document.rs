#![forbid(unsafe_code)]

//! Mutable arena document.
//!
//! Nodes live in a single vector and are addressed by [`NodeId`]. Structural
//! edits (`detach`, `insert_before`, `replace`) only relink neighbours, so a
//! handle taken before an edit keeps pointing at the same node afterwards,
//! whether or not that node is still attached to the tree.

use std::collections::{BTreeMap, HashMap};

use wssec_core::{ns, Error, Result};

/// Stable handle of a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Qualified name of an element or attribute.
///
/// An empty `prefix` means unprefixed; an empty `namespace` means no namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    pub prefix: String,
    pub local: String,
    pub namespace: String,
}

impl QName {
    pub fn new(prefix: &str, local: &str, namespace: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
            local: local.to_owned(),
            namespace: namespace.to_owned(),
        }
    }

    /// Unqualified, namespace-less name.
    pub fn local(local: &str) -> Self {
        Self::new("", local, "")
    }

    /// `prefix:local`, or just `local` when unprefixed.
    pub fn qualified(&self) -> String {
        if self.prefix.is_empty() {
            self.local.clone()
        } else {
            format!("{}:{}", self.prefix, self.local)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    /// Namespace declarations made on this element as `(prefix, uri)`.
    /// The default namespace uses the empty prefix; `("", "")` undeclares it.
    pub namespaces: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    last_child: Option<NodeId>,
    prev_sibling: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

/// Local names always treated as element IDs.
pub const DEFAULT_ID_ATTRS: [&str; 4] = ["Id", "ID", "id", "AssertionID"];

/// Map from ID attribute value to the element carrying it.
pub type IdMap = HashMap<String, NodeId>;

/// An owned, mutable XML document.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document containing only the document node.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                first_child: None,
                last_child: None,
                prev_sibling: None,
                next_sibling: None,
            }],
        }
    }

    /// Parse XML text into a new document.
    pub fn parse(text: &str) -> Result<Self> {
        let parsed = roxmltree::Document::parse_with_options(text, crate::parsing_options())
            .map_err(|e| Error::XmlParse(e.to_string()))?;
        let mut doc = Self::new();
        let root = doc.root();
        let scope = BTreeMap::new();
        for child in parsed.root().children() {
            if let Some(id) = doc.convert(text, child, &scope) {
                doc.append_child(root, id);
            }
        }
        if doc.document_element().is_none() {
            return Err(Error::XmlParse("document has no root element".into()));
        }
        Ok(doc)
    }

    /// Parse UTF-8 bytes into a new document.
    pub fn parse_bytes(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?;
        Self::parse(text)
    }

    fn convert(
        &mut self,
        src: &str,
        node: roxmltree::Node<'_, '_>,
        parent_scope: &BTreeMap<String, String>,
    ) -> Option<NodeId> {
        match node.node_type() {
            roxmltree::NodeType::Element => {
                let mut scope = BTreeMap::new();
                for n in node.namespaces() {
                    let prefix = n.name().unwrap_or("");
                    if prefix == "xml" {
                        continue;
                    }
                    scope.insert(prefix.to_owned(), n.uri().to_owned());
                }
                let mut namespaces: Vec<(String, String)> = scope
                    .iter()
                    .filter(|(p, u)| parent_scope.get(*p) != Some(*u))
                    .map(|(p, u)| (p.clone(), u.clone()))
                    .collect();
                if parent_scope.contains_key("") && !scope.contains_key("") {
                    namespaces.push((String::new(), String::new()));
                }

                let tag = node.tag_name();
                let namespace = tag.namespace().unwrap_or("").to_owned();
                let prefix = source_prefix(src, node.range().start)
                    .unwrap_or_else(|| prefix_for(&scope, &namespace));
                let attributes = node
                    .attributes()
                    .map(|a| {
                        let ans = a.namespace().unwrap_or("");
                        let aprefix = if ans.is_empty() {
                            String::new()
                        } else if ans == ns::XML {
                            "xml".to_owned()
                        } else {
                            prefix_for(&scope, ans)
                        };
                        Attribute {
                            name: QName::new(&aprefix, a.name(), ans),
                            value: a.value().to_owned(),
                        }
                    })
                    .collect();

                let id = self.push(NodeKind::Element(Element {
                    name: QName {
                        prefix,
                        local: tag.name().to_owned(),
                        namespace,
                    },
                    attributes,
                    namespaces,
                }));
                for child in node.children() {
                    if let Some(c) = self.convert(src, child, &scope) {
                        self.append_child(id, c);
                    }
                }
                Some(id)
            }
            roxmltree::NodeType::Text => Some(self.push(NodeKind::Text(
                node.text().unwrap_or("").to_owned(),
            ))),
            roxmltree::NodeType::Comment => Some(self.push(NodeKind::Comment(
                node.text().unwrap_or("").to_owned(),
            ))),
            roxmltree::NodeType::PI => node.pi().map(|pi| {
                self.push(NodeKind::ProcessingInstruction {
                    target: pi.target.to_owned(),
                    data: pi.value.unwrap_or("").to_owned(),
                })
            }),
            roxmltree::NodeType::Root => None,
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
        });
        id
    }

    // ── Navigation ───────────────────────────────────────────────────

    /// The document node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The single top-level element.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root()).find(|&c| self.is_element(c))
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element(_))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].first_child
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].next_sibling
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].prev_sibling
    }

    /// Nearest ancestor that is an element.
    pub fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        self.parent(id).filter(|&p| self.is_element(p))
    }

    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            doc: self,
            next: self.first_child(id),
        }
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).filter(move |&c| self.is_element(c))
    }

    /// All nodes below `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            root: id,
            next: self.first_child(id),
        }
    }

    /// Following element siblings of `id`, in document order.
    pub fn following_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.next_sibling(id), move |&n| self.next_sibling(n))
            .filter(move |&n| self.is_element(n))
    }

    /// Whether `id` is reachable from the document node.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            if cur == self.root() {
                return true;
            }
            match self.parent(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    pub fn local_name(&self, id: NodeId) -> &str {
        self.element(id).map(|e| e.name.local.as_str()).unwrap_or("")
    }

    pub fn namespace(&self, id: NodeId) -> &str {
        self.element(id)
            .map(|e| e.name.namespace.as_str())
            .unwrap_or("")
    }

    /// Whether `id` is an element with the given namespace and local name.
    pub fn is_named(&self, id: NodeId, namespace: &str, local: &str) -> bool {
        self.element(id)
            .is_some_and(|e| e.name.local == local && e.name.namespace == namespace)
    }

    /// First child element with the given namespace and local name.
    pub fn child_element(&self, parent: NodeId, namespace: &str, local: &str) -> Option<NodeId> {
        self.child_elements(parent)
            .find(|&c| self.is_named(c, namespace, local))
    }

    /// First child element with the given local name in any namespace.
    pub fn child_element_local(&self, parent: NodeId, local: &str) -> Option<NodeId> {
        self.child_elements(parent)
            .find(|&c| self.local_name(c) == local)
    }

    /// First descendant element with the given namespace and local name.
    pub fn find_descendant(&self, id: NodeId, namespace: &str, local: &str) -> Option<NodeId> {
        self.descendants(id)
            .find(|&d| self.is_named(d, namespace, local))
    }

    /// Value of the un-namespaced attribute `local`.
    pub fn attribute(&self, id: NodeId, local: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|a| a.name.namespace.is_empty() && a.name.local == local)
            .map(|a| a.value.as_str())
    }

    /// Value of the attribute `local` in `namespace`.
    pub fn attribute_ns(&self, id: NodeId, namespace: &str, local: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|a| a.name.namespace == namespace && a.name.local == local)
            .map(|a| a.value.as_str())
    }

    /// Value of the first attribute named `local`, whatever its namespace.
    pub fn attribute_any_ns(&self, id: NodeId, local: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|a| a.name.local == local)
            .map(|a| a.value.as_str())
    }

    /// Set (or add) an attribute.
    pub fn set_attribute(&mut self, id: NodeId, name: QName, value: &str) {
        if let Some(el) = self.element_mut(id) {
            match el
                .attributes
                .iter_mut()
                .find(|a| a.name.local == name.local && a.name.namespace == name.namespace)
            {
                Some(a) => a.value = value.to_owned(),
                None => el.attributes.push(Attribute {
                    name,
                    value: value.to_owned(),
                }),
            }
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        match self.kind(id) {
            NodeKind::Text(t) => t.clone(),
            _ => self
                .descendants(id)
                .filter_map(|d| match self.kind(d) {
                    NodeKind::Text(t) => Some(t.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Trimmed text content, or `None` when empty.
    pub fn trimmed_text(&self, id: NodeId) -> Option<String> {
        let text = self.text_content(id);
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_owned())
    }

    /// Namespace bindings in scope at `id` as prefix → URI.
    ///
    /// Bindings are collected from the ancestors that are still linked. The
    /// element's own name and attribute prefixes are added when no ancestor
    /// binds them, so a detached or synthesized subtree still resolves its
    /// own prefixes.
    pub fn in_scope_namespaces(&self, id: NodeId) -> BTreeMap<String, String> {
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            if self.is_element(n) {
                chain.push(n);
            }
            cur = self.parent(n);
        }
        let mut scope = BTreeMap::new();
        for &n in chain.iter().rev() {
            if let Some(el) = self.element(n) {
                for (p, u) in &el.namespaces {
                    if u.is_empty() {
                        scope.remove(p);
                    } else {
                        scope.insert(p.clone(), u.clone());
                    }
                }
            }
        }
        if let Some(el) = self.element(id) {
            let own = std::iter::once(&el.name).chain(el.attributes.iter().map(|a| &a.name));
            for name in own {
                if !name.namespace.is_empty() && name.prefix != "xml" {
                    scope
                        .entry(name.prefix.clone())
                        .or_insert_with(|| name.namespace.clone());
                }
            }
        }
        scope
    }

    // ── Mutation ─────────────────────────────────────────────────────

    pub fn create_element(&mut self, name: QName) -> NodeId {
        let mut namespaces = Vec::new();
        if !name.namespace.is_empty() {
            namespaces.push((name.prefix.clone(), name.namespace.clone()));
        }
        self.push(NodeKind::Element(Element {
            name,
            attributes: Vec::new(),
            namespaces,
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_owned()))
    }

    /// Unlink `id` from its parent and siblings. Its subtree stays intact.
    pub fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = {
            let n = &self.nodes[id.0];
            (n.parent, n.prev_sibling, n.next_sibling)
        };
        if let Some(p) = prev {
            self.nodes[p.0].next_sibling = next;
        } else if let Some(par) = parent {
            self.nodes[par.0].first_child = next;
        }
        if let Some(nx) = next {
            self.nodes[nx.0].prev_sibling = prev;
        } else if let Some(par) = parent {
            self.nodes[par.0].last_child = prev;
        }
        let n = &mut self.nodes[id.0];
        n.parent = None;
        n.prev_sibling = None;
        n.next_sibling = None;
    }

    /// Insert `new` under `parent` before `reference`, or last when
    /// `reference` is `None`. `new` is detached from any previous position.
    pub fn insert_before(&mut self, parent: NodeId, new: NodeId, reference: Option<NodeId>) {
        self.detach(new);
        let Some(reference) = reference else {
            self.append_child(parent, new);
            return;
        };
        let prev = self.nodes[reference.0].prev_sibling;
        {
            let n = &mut self.nodes[new.0];
            n.parent = Some(parent);
            n.prev_sibling = prev;
            n.next_sibling = Some(reference);
        }
        self.nodes[reference.0].prev_sibling = Some(new);
        match prev {
            Some(p) => self.nodes[p.0].next_sibling = Some(new),
            None => self.nodes[parent.0].first_child = Some(new),
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        let last = self.nodes[parent.0].last_child;
        {
            let n = &mut self.nodes[child.0];
            n.parent = Some(parent);
            n.prev_sibling = last;
        }
        match last {
            Some(l) => self.nodes[l.0].next_sibling = Some(child),
            None => self.nodes[parent.0].first_child = Some(child),
        }
        self.nodes[parent.0].last_child = Some(child);
    }

    /// Put `replacement` where `old` was and detach `old`.
    pub fn replace(&mut self, old: NodeId, replacement: &[NodeId]) -> Result<()> {
        let parent = self
            .parent(old)
            .ok_or_else(|| Error::XmlStructure("cannot replace a detached node".into()))?;
        for &r in replacement {
            self.insert_before(parent, r, Some(old));
        }
        self.detach(old);
        Ok(())
    }

    /// Parse `xml` as element content in the namespace context of `context`
    /// and return the resulting top-level nodes, not yet attached.
    pub fn import_fragment(&mut self, context: NodeId, xml: &str) -> Result<Vec<NodeId>> {
        let scope = self.in_scope_namespaces(context);
        let mut wrapper = String::from("<wssec-fragment");
        for (prefix, uri) in &scope {
            if prefix.is_empty() {
                wrapper.push_str(" xmlns=\"");
            } else {
                wrapper.push_str(&format!(" xmlns:{prefix}=\""));
            }
            wrapper.push_str(&crate::writer::escape_attr(uri));
            wrapper.push('"');
        }
        wrapper.push('>');
        wrapper.push_str(xml);
        wrapper.push_str("</wssec-fragment>");

        let parsed = roxmltree::Document::parse_with_options(&wrapper, crate::parsing_options())
            .map_err(|e| Error::XmlParse(format!("decrypted content is not well-formed: {e}")))?;
        let outer = parsed.root_element();
        let mut outer_scope = BTreeMap::new();
        for n in outer.namespaces() {
            let prefix = n.name().unwrap_or("");
            if prefix != "xml" {
                outer_scope.insert(prefix.to_owned(), n.uri().to_owned());
            }
        }
        let mut out = Vec::new();
        for child in outer.children() {
            if let Some(id) = self.convert(&wrapper, child, &outer_scope) {
                out.push(id);
            }
        }
        Ok(out)
    }

    // ── IDs ──────────────────────────────────────────────────────────

    /// Map every ID attribute value on attached elements to its element.
    ///
    /// Attributes whose local name is one of [`DEFAULT_ID_ATTRS`] or
    /// `extra` count as IDs, in any namespace (so `wsu:Id` is covered).
    /// Two different elements sharing a value is an error.
    pub fn id_map(&self, extra: &[String]) -> Result<IdMap> {
        let mut map = IdMap::new();
        for node in self.descendants(self.root()) {
            let Some(el) = self.element(node) else {
                continue;
            };
            for a in &el.attributes {
                let is_id = DEFAULT_ID_ATTRS.contains(&a.name.local.as_str())
                    || extra.iter().any(|x| *x == a.name.local);
                if !is_id {
                    continue;
                }
                match map.get(&a.value) {
                    Some(&other) if other != node => {
                        return Err(Error::XmlStructure(format!(
                            "duplicate element ID \"{}\"",
                            a.value
                        )));
                    }
                    _ => {
                        map.insert(a.value.clone(), node);
                    }
                }
            }
        }
        Ok(map)
    }

    /// The ID carried by `id`, if any, preferring `wsu:Id`.
    pub fn element_id(&self, id: NodeId, extra: &[String]) -> Option<&str> {
        let el = self.element(id)?;
        el.attributes
            .iter()
            .find(|a| a.name.local == "Id" && ns::is_wsu_ns(&a.name.namespace))
            .or_else(|| {
                el.attributes.iter().find(|a| {
                    DEFAULT_ID_ATTRS.contains(&a.name.local.as_str())
                        || extra.iter().any(|x| *x == a.name.local)
                })
            })
            .map(|a| a.value.as_str())
    }

    // ── Serialization ────────────────────────────────────────────────

    /// Serialize the subtree at `id`.
    pub fn to_xml(&self, id: NodeId) -> String {
        let mut out = String::new();
        crate::writer::write_node(self, id, &mut out);
        out
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_xml(self.root()))
    }
}

/// Prefix of the start tag beginning at `start`, read from the source text.
fn source_prefix(src: &str, start: usize) -> Option<String> {
    let tag = src.get(start..)?.strip_prefix('<')?;
    let end = tag
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(tag.len());
    let qname = &tag[..end];
    Some(
        qname
            .split_once(':')
            .map(|(p, _)| p.to_owned())
            .unwrap_or_default(),
    )
}

fn prefix_for(scope: &BTreeMap<String, String>, namespace: &str) -> String {
    if namespace.is_empty() {
        return String::new();
    }
    scope
        .iter()
        .find(|(p, u)| !p.is_empty() && u.as_str() == namespace)
        .or_else(|| scope.iter().find(|(_, u)| u.as_str() == namespace))
        .map(|(p, _)| p.clone())
        .unwrap_or_default()
}

pub struct Children<'a> {
    doc: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let cur = self.next?;
        self.next = self.doc.next_sibling(cur);
        Some(cur)
    }
}

pub struct Descendants<'a> {
    doc: &'a Document,
    root: NodeId,
    next: Option<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let cur = self.next?;
        self.next = if let Some(c) = self.doc.first_child(cur) {
            Some(c)
        } else {
            let mut n = cur;
            loop {
                if n == self.root {
                    break None;
                }
                if let Some(s) = self.doc.next_sibling(n) {
                    break Some(s);
                }
                match self.doc.parent(n) {
                    Some(p) if p != self.root => n = p,
                    _ => break None,
                }
            }
        };
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOAP: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd"><soap:Header/><soap:Body wsu:Id="body"><m:Ping xmlns:m="urn:ping">hi</m:Ping><m:Pong xmlns:m="urn:ping"/></soap:Body></soap:Envelope>"#;

    #[test]
    fn parse_keeps_prefixes_and_declarations() {
        let doc = Document::parse(SOAP).unwrap();
        let env = doc.document_element().unwrap();
        let el = doc.element(env).unwrap();
        assert_eq!(el.name.prefix, "soap");
        assert_eq!(el.name.namespace, ns::SOAP11_ENV);
        assert_eq!(el.namespaces.len(), 2);

        let body = doc.child_element(env, ns::SOAP11_ENV, "Body").unwrap();
        assert!(doc.element(body).unwrap().namespaces.is_empty());
        assert_eq!(doc.attribute_ns(body, ns::WSU, "Id"), Some("body"));
        let id_attr = &doc.element(body).unwrap().attributes[0];
        assert_eq!(id_attr.name.prefix, "wsu");
    }

    #[test]
    fn detach_and_reinsert_keeps_handles() {
        let mut doc = Document::parse(SOAP).unwrap();
        let env = doc.document_element().unwrap();
        let body = doc.child_element(env, ns::SOAP11_ENV, "Body").unwrap();
        let ping = doc.child_element(body, "urn:ping", "Ping").unwrap();
        let pong = doc.next_sibling(ping).unwrap();

        doc.detach(ping);
        assert!(!doc.is_attached(ping));
        assert_eq!(doc.first_child(body), Some(pong));
        assert_eq!(doc.text_content(ping), "hi");

        doc.insert_before(body, ping, Some(pong));
        assert!(doc.is_attached(ping));
        assert_eq!(doc.to_xml(env), SOAP);
    }

    #[test]
    fn replace_with_several_nodes() {
        let mut doc = Document::parse("<a><b/><c/></a>").unwrap();
        let a = doc.document_element().unwrap();
        let b = doc.first_child(a).unwrap();
        let x = doc.create_element(QName::local("x"));
        let t = doc.create_text("t");
        doc.replace(b, &[x, t]).unwrap();
        assert_eq!(doc.to_xml(a), "<a><x/>t<c/></a>");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let doc = Document::parse(r#"<a><b Id="x"/><c xmlns:wsu="urn:u" wsu:Id="x"/></a>"#).unwrap();
        assert!(matches!(doc.id_map(&[]), Err(Error::XmlStructure(_))));
    }

    #[test]
    fn detached_elements_leave_the_id_map() {
        let mut doc = Document::parse(r#"<a><b Id="x"/><c Id="y"/></a>"#).unwrap();
        let a = doc.document_element().unwrap();
        let b = doc.first_child(a).unwrap();
        doc.detach(b);
        let map = doc.id_map(&[]).unwrap();
        assert!(!map.contains_key("x"));
        assert!(map.contains_key("y"));
    }

    #[test]
    fn fragment_inherits_context_namespaces() {
        let mut doc = Document::parse(SOAP).unwrap();
        let env = doc.document_element().unwrap();
        let body = doc.child_element(env, ns::SOAP11_ENV, "Body").unwrap();
        let nodes = doc
            .import_fragment(body, "<soap:Fault><faultcode>x</faultcode></soap:Fault>")
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(doc.is_named(nodes[0], ns::SOAP11_ENV, "Fault"));
        assert!(doc.element(nodes[0]).unwrap().namespaces.is_empty());
    }

    #[test]
    fn detached_subtree_keeps_own_namespace() {
        let mut doc = Document::parse(SOAP).unwrap();
        let env = doc.document_element().unwrap();
        let body = doc.child_element(env, ns::SOAP11_ENV, "Body").unwrap();
        doc.detach(body);
        let scope = doc.in_scope_namespaces(body);
        assert_eq!(scope.get("soap").map(String::as_str), Some(ns::SOAP11_ENV));
        assert_eq!(scope.get("wsu").map(String::as_str), Some(ns::WSU));
    }

    #[test]
    fn descendants_stay_inside_subtree() {
        let doc = Document::parse("<a><b><c/></b><d/></a>").unwrap();
        let a = doc.document_element().unwrap();
        let b = doc.first_child(a).unwrap();
        let names: Vec<_> = doc.descendants(b).map(|n| doc.local_name(n).to_owned()).collect();
        assert_eq!(names, vec!["c"]);
    }
}
