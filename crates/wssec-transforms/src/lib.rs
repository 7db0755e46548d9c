#![forbid(unsafe_code)]

//! Reference processing for WS-Security signatures.
//!
//! Implements the transform chain model from XML-DSig: each reference
//! selects a node set or an attachment, then applies its transforms in
//! order to produce the octets that are digested.

pub mod enveloped;
pub mod pipeline;
pub mod uri;

pub use enveloped::EnvelopedSignatureTransform;
pub use pipeline::{
    AttachmentContentTransform, C14nTransform, StrTransform, Transform, TransformData,
    TransformPipeline,
};
pub use uri::ReferenceUri;
