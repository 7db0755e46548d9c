#![forbid(unsafe_code)]

//! Mutable XML document model for WS-Security processing.
//!
//! Documents are parsed with `roxmltree` and converted into an arena of
//! nodes that can be detached, re-inserted and replaced in place while
//! decrypting and verifying a message. `NodeSet` carries the node
//! selections used by canonicalization and signature transforms.

pub mod document;
pub mod nodeset;
pub mod writer;

pub use document::{Attribute, Document, Element, IdMap, NodeId, NodeKind, QName};
pub use nodeset::NodeSet;

/// Return the roxmltree parsing options used for inbound messages.
///
/// SOAP forbids a document type declaration, so DTDs are rejected rather
/// than parsed.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: false,
        ..roxmltree::ParsingOptions::default()
    }
}
