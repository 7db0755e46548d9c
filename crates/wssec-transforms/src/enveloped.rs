#![forbid(unsafe_code)]

//! Enveloped signature transform.
//!
//! Removes the `<Signature>` element being verified, and everything below
//! it, from the node set.

use crate::pipeline::{Transform, TransformData};
use wssec_core::{algorithm, Error};
use wssec_xml::NodeId;

pub struct EnvelopedSignatureTransform {
    signature: NodeId,
}

impl EnvelopedSignatureTransform {
    pub fn new(signature: NodeId) -> Self {
        Self { signature }
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute<'d>(&self, input: TransformData<'d>) -> Result<TransformData<'d>, Error> {
        match input {
            TransformData::Xml {
                doc,
                start,
                mut node_set,
            } => {
                node_set.remove_subtree(self.signature, doc);
                Ok(TransformData::Xml {
                    doc,
                    start,
                    node_set,
                })
            }
            TransformData::Binary(_) => Err(Error::Transform(
                "enveloped-signature transform requires XML input".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wssec_xml::Document;

    #[test]
    fn signature_subtree_is_excluded() {
        let doc = Document::parse("<r><data>1</data><Signature><v>x</v></Signature></r>").unwrap();
        let root = doc.document_element().unwrap();
        let sig = doc.child_element_local(root, "Signature").unwrap();

        let out = EnvelopedSignatureTransform::new(sig)
            .execute(TransformData::whole_document(&doc))
            .unwrap()
            .into_binary()
            .unwrap();
        assert_eq!(out, b"<r><data>1</data></r>");
    }
}
