#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use wssec_c14n::C14nMode;
use wssec_core::{algorithm, Error};
use wssec_xml::{Document, NodeId, NodeSet};

/// Data flowing through the transform pipeline.
pub enum TransformData<'d> {
    /// A node set over the message document. `start` is the document node
    /// for `URI=""` and the referenced element for `URI="#id"`.
    Xml {
        doc: &'d Document,
        start: NodeId,
        node_set: NodeSet,
    },
    /// Octets: canonical XML or an attachment body.
    Binary(Vec<u8>),
}

impl<'d> TransformData<'d> {
    /// The node set `URI=""` selects.
    pub fn whole_document(doc: &'d Document) -> Self {
        TransformData::Xml {
            doc,
            start: doc.root(),
            node_set: NodeSet::all_without_comments(doc),
        }
    }

    /// The node set `URI="#id"` selects.
    pub fn subtree(doc: &'d Document, element: NodeId) -> Self {
        TransformData::Xml {
            doc,
            start: element,
            node_set: NodeSet::tree_without_comments(element, doc),
        }
    }

    /// Convert to octets, applying inclusive C14N to a node set.
    pub fn into_binary(self) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Binary(data) => Ok(data),
            TransformData::Xml { doc, start, node_set } => {
                wssec_c14n::canonicalize(doc, start, C14nMode::Inclusive, Some(&node_set), &[])
            }
        }
    }
}

/// Trait for individual transforms.
pub trait Transform: Send {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    /// Execute the transform on the given data.
    fn execute<'d>(&self, input: TransformData<'d>) -> Result<TransformData<'d>, Error>;
}

/// A pipeline of transforms executed in sequence.
#[derive(Default)]
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Execute all transforms in order.
    pub fn execute<'d>(&self, input: TransformData<'d>) -> Result<TransformData<'d>, Error> {
        let mut data = input;
        for transform in &self.transforms {
            data = transform.execute(data)?;
        }
        Ok(data)
    }

    /// Run the pipeline and produce the octets to digest.
    pub fn digest_input(&self, input: TransformData<'_>) -> Result<Vec<u8>, Error> {
        self.execute(input)?.into_binary()
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.transforms.iter().map(|t| t.uri())
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

// ── C14N Transform ───────────────────────────────────────────────────

/// A canonicalization transform.
pub struct C14nTransform {
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl C14nTransform {
    pub fn new(mode: C14nMode, inclusive_prefixes: Vec<String>) -> Self {
        Self {
            mode,
            inclusive_prefixes,
        }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute<'d>(&self, input: TransformData<'d>) -> Result<TransformData<'d>, Error> {
        match input {
            TransformData::Xml { doc, start, node_set } => {
                let bytes = wssec_c14n::canonicalize(
                    doc,
                    start,
                    self.mode,
                    Some(&node_set),
                    &self.inclusive_prefixes,
                )?;
                Ok(TransformData::Binary(bytes))
            }
            TransformData::Binary(data) => {
                let doc = Document::parse_bytes(&data)
                    .map_err(|e| Error::Transform(format!("c14n input is not XML: {e}")))?;
                let bytes = wssec_c14n::canonicalize(
                    &doc,
                    doc.root(),
                    self.mode,
                    None,
                    &self.inclusive_prefixes,
                )?;
                Ok(TransformData::Binary(bytes))
            }
        }
    }
}

// ── STR Transform ────────────────────────────────────────────────────

/// The WS-Security STR-Transform.
///
/// The reference selects a `SecurityTokenReference`; the digest covers the
/// token it points at, canonicalized with the method from
/// `TransformationParameters`. The caller dereferences the STR and supplies
/// the token element.
pub struct StrTransform {
    token: NodeId,
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl StrTransform {
    pub fn new(token: NodeId, mode: C14nMode, inclusive_prefixes: Vec<String>) -> Self {
        Self {
            token,
            mode,
            inclusive_prefixes,
        }
    }
}

impl Transform for StrTransform {
    fn uri(&self) -> &str {
        algorithm::STR_TRANSFORM
    }

    fn execute<'d>(&self, input: TransformData<'d>) -> Result<TransformData<'d>, Error> {
        match input {
            TransformData::Xml { doc, .. } => {
                let bytes = wssec_c14n::canonicalize_subtree(
                    doc,
                    self.token,
                    self.mode,
                    &self.inclusive_prefixes,
                )?;
                Ok(TransformData::Binary(bytes))
            }
            TransformData::Binary(_) => Err(Error::Transform(
                "STR-Transform requires a SecurityTokenReference node set".into(),
            )),
        }
    }
}

// ── Attachment content ───────────────────────────────────────────────

/// SwA Attachment-Content-Signature-Transform: the digest covers the MIME
/// part body as is.
pub struct AttachmentContentTransform;

impl Transform for AttachmentContentTransform {
    fn uri(&self) -> &str {
        algorithm::ATTACHMENT_CONTENT_TRANSFORM
    }

    fn execute<'d>(&self, input: TransformData<'d>) -> Result<TransformData<'d>, Error> {
        match input {
            TransformData::Binary(body) => Ok(TransformData::Binary(body)),
            TransformData::Xml { .. } => Err(Error::Transform(
                "attachment content transform requires a MIME part".into(),
            )),
        }
    }
}
