#![forbid(unsafe_code)]

//! WS-Security message processing for SOAP gateways.
//!
//! Re-exports the workspace crates and adds the few helpers the `wssec`
//! binary needs to locate the security header of an inbound envelope.

pub use wssec_c14n as c14n;
pub use wssec_core as core;
pub use wssec_crypto as crypto;
pub use wssec_keys as keys;
pub use wssec_processor as processor;
pub use wssec_transforms as transforms;
pub use wssec_xml as xml;

use wssec_core::ns::{self, node};
use wssec_xml::{Document, NodeId};

/// The first `wsse:Security` block in the SOAP header, in any of the
/// accepted security namespaces.
pub fn find_security_header(doc: &Document) -> Option<NodeId> {
    let envelope = doc.document_element()?;
    if doc.local_name(envelope) != "Envelope" {
        return None;
    }
    let header = doc
        .child_elements(envelope)
        .find(|&c| doc.local_name(c) == "Header" && is_soap_ns(doc.namespace(c)))?;
    doc.child_elements(header).find(|&c| {
        doc.local_name(c) == node::SECURITY && ns::is_security_ns(doc.namespace(c))
    })
}

fn is_soap_ns(uri: &str) -> bool {
    uri == ns::SOAP11_ENV || uri == ns::SOAP12_ENV
}
