#![forbid(unsafe_code)]

//! URI resolution for XML-DSig references.
//!
//! Handles:
//! - Empty URI (""): the entire document minus comments
//! - Same-document references ("#id" and "#xpointer(id('id'))")
//! - SwA attachment references ("cid:...")

use crate::pipeline::TransformData;
use wssec_core::Error;
use wssec_xml::{Document, IdMap, NodeId};

/// A parsed `Reference/@URI`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceUri<'a> {
    /// `URI=""`
    WholeDocument,
    /// `URI="#id"`
    SameDocument(&'a str),
    /// `URI="cid:content-id"`, holding the content id
    Attachment(&'a str),
    /// Anything else
    External(&'a str),
}

impl<'a> ReferenceUri<'a> {
    pub fn parse(uri: &'a str) -> Self {
        if uri.is_empty() || uri == "#xpointer(/)" {
            ReferenceUri::WholeDocument
        } else if let Some(fragment) = uri.strip_prefix('#') {
            ReferenceUri::SameDocument(parse_xpointer_id(fragment).unwrap_or(fragment))
        } else if let Some(cid) = uri.strip_prefix("cid:") {
            ReferenceUri::Attachment(cid)
        } else {
            ReferenceUri::External(uri)
        }
    }
}

/// `xpointer(id('foo'))` → `foo`
fn parse_xpointer_id(fragment: &str) -> Option<&str> {
    let inner = fragment.strip_prefix("xpointer(id(")?.strip_suffix("))")?;
    inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
}

/// Look up a same-document id.
pub fn resolve_id(id_map: &IdMap, id: &str) -> Result<NodeId, Error> {
    id_map
        .get(id)
        .copied()
        .ok_or_else(|| Error::InvalidUri(format!("reference #{id} does not resolve to an element")))
}

/// Resolve a same-document URI to the node set it selects.
pub fn resolve_same_document<'d>(
    uri: &str,
    doc: &'d Document,
    id_map: &IdMap,
) -> Result<TransformData<'d>, Error> {
    match ReferenceUri::parse(uri) {
        ReferenceUri::WholeDocument => Ok(TransformData::whole_document(doc)),
        ReferenceUri::SameDocument(id) => {
            let element = resolve_id(id_map, id)?;
            Ok(TransformData::subtree(doc, element))
        }
        ReferenceUri::Attachment(_) | ReferenceUri::External(_) => Err(Error::InvalidUri(format!(
            "not a same-document reference: {uri}"
        ))),
    }
}
