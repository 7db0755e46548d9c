#![forbid(unsafe_code)]

//! XML Canonicalization (C14N) over the wssec arena document.
//!
//! Implements the four variants a WS-Security message may name:
//! - Canonical XML 1.0 (with and without comments)
//! - Exclusive Canonical XML 1.0 (with and without comments)

pub mod escape;
pub mod exclusive;
pub mod inclusive;
pub mod render;

use wssec_core::{algorithm, Error};
use wssec_xml::{Document, NodeId, NodeSet};

/// The canonicalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMode {
    /// Canonical XML 1.0
    Inclusive,
    /// Canonical XML 1.0 with comments
    InclusiveWithComments,
    /// Exclusive Canonical XML 1.0
    Exclusive,
    /// Exclusive Canonical XML 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMode {
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive => algorithm::C14N,
            Self::InclusiveWithComments => algorithm::C14N_WITH_COMMENTS,
            Self::Exclusive => algorithm::EXC_C14N,
            Self::ExclusiveWithComments => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::C14N => Some(Self::Inclusive),
            algorithm::C14N_WITH_COMMENTS => Some(Self::InclusiveWithComments),
            algorithm::EXC_C14N => Some(Self::Exclusive),
            algorithm::EXC_C14N_WITH_COMMENTS => Some(Self::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(self, Self::InclusiveWithComments | Self::ExclusiveWithComments)
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }
}

/// Canonicalize the nodes of `node_set` reachable from `start`.
///
/// - `start`: the document node for whole-document input, or the apex of
///   a (possibly detached) subtree
/// - `node_set`: `None` renders everything below `start`
/// - `inclusive_prefixes`: the InclusiveNamespaces PrefixList, exclusive mode only
pub fn canonicalize(
    doc: &Document,
    start: NodeId,
    mode: C14nMode,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    if mode.is_exclusive() {
        exclusive::canonicalize(doc, start, mode.with_comments(), node_set, inclusive_prefixes)
    } else {
        inclusive::canonicalize(doc, start, mode.with_comments(), node_set)
    }
}

/// Canonicalize the subtree rooted at `element` on its own.
pub fn canonicalize_subtree(
    doc: &Document,
    element: NodeId,
    mode: C14nMode,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let set = if mode.with_comments() {
        NodeSet::tree_with_comments(element, doc)
    } else {
        NodeSet::tree_without_comments(element, doc)
    };
    canonicalize(doc, element, mode, Some(&set), inclusive_prefixes)
}
