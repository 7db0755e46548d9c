#![forbid(unsafe_code)]

//! WS-Security message processing.
//!
//! A [`ProcessingPass`] owns one inbound SOAP document and works through its
//! `wsse:Security` header: it resolves the tokens that signatures and
//! encrypted keys refer to, verifies signatures, decrypts encrypted content
//! in place, and records what it found in a [`ProcessorResult`].
//!
//! Passes are single-threaded. Everything that outlives a pass (certificate
//! stores, private keys, the unwrapped-key cache) is borrowed from a shared
//! [`ProcessorContext`].

pub mod cache;
pub mod collaborators;
pub mod context;
mod decrypt;
mod encrypted_key;
pub mod error;
mod header;
mod resolver;
pub mod result;
pub mod token;
mod verify;

#[cfg(test)]
mod fixtures;

use std::collections::HashMap;

use tracing::debug;
use wssec_keys::X509Certificate;
use wssec_xml::{Document, IdMap, NodeId};

pub use cache::{EncryptedKeyCache, SecretKey, ShardedKeyCache};
pub use collaborators::{
    CertificateResolver, CertificateStore, LocalKeyTarget, PrivateKeyTargetResolver,
    RecipientHint, SecurityContext, SecurityContextFinder, StaticSecurityContexts,
};
pub use context::{ProcessorConfig, ProcessorContext};
pub use error::{IgnoreReason, Outcome, ProcessingError, Result};
pub use result::{
    EncryptedElement, MimePart, ProcessorResult, SignatureConfirmation, SignedElement, SignedPart,
    Timestamp,
};
pub use token::{Token, TokenRef, X509Origin};

use resolver::TokenIndex;

/// Processing state for one message.
pub struct ProcessingPass<'c> {
    ctx: &'c ProcessorContext,
    doc: Document,
    ids: IdMap,
    result: ProcessorResult,
    security_header: Option<NodeId>,
    sender_certificate: Option<X509Certificate>,
    parts: Vec<MimePart>,
    index: TokenIndex,
    /// `SecurityTokenReference` → the token element it names.
    str_to_target: HashMap<NodeId, NodeId>,
    /// `EncryptedKey` elements processed so far, in order.
    consumed_keys: Vec<NodeId>,
}

impl<'c> ProcessingPass<'c> {
    /// Start a pass over `doc`.
    ///
    /// Fails if two attached elements carry the same ID, since a reference
    /// to such an ID could be redirected to content the signer never saw.
    pub fn new(doc: Document, ctx: &'c ProcessorContext) -> Result<Self> {
        let ids = doc.id_map(&ctx.config.id_attributes)?;
        Ok(Self {
            ctx,
            doc,
            ids,
            result: ProcessorResult::default(),
            security_header: None,
            sender_certificate: None,
            parts: Vec::new(),
            index: TokenIndex::default(),
            str_to_target: HashMap::new(),
            consumed_keys: Vec::new(),
        })
    }

    /// The certificate the sender is known to use, as established outside
    /// the message. Used when a `KeyIdentifier` names it only by SKI.
    pub fn with_sender_certificate(mut self, cert: X509Certificate) -> Self {
        self.sender_certificate = Some(cert);
        self
    }

    /// MIME attachments that `cid:` references may name.
    pub fn with_parts(mut self, parts: Vec<MimePart>) -> Self {
        self.parts = parts;
        self
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn result(&self) -> &ProcessorResult {
        &self.result
    }

    /// End the pass and hand back the (decrypted) document and the result.
    pub fn finish(mut self) -> Result<(Document, ProcessorResult)> {
        if let Some(ts) = self.result.timestamp.as_ref().map(|t| t.element) {
            let signers = self.result.signing_tokens(ts);
            if signers.len() > 1 {
                return Err(ProcessingError::Processor(
                    "Timestamp is signed by more than one token".into(),
                ));
            }
            if let Some(t) = self.result.timestamp.as_mut() {
                t.signed = signers.len() == 1;
            }
        }
        if self.result.wsu_ns.is_none() {
            self.result.wsu_ns = self.wsu_ns_from_tokens();
        }
        debug!(
            tokens = self.result.tokens.len(),
            signed = self.result.signed_elements.len(),
            encrypted = self.result.encrypted_elements.len(),
            "processing pass finished"
        );
        Ok((self.doc, self.result))
    }

    fn wsu_ns_from_tokens(&self) -> Option<String> {
        self.result
            .tokens
            .iter()
            .filter_map(|t| t.element())
            .filter_map(|el| self.doc.element(el))
            .flat_map(|el| el.attributes.iter())
            .find(|a| a.name.local == wssec_core::ns::attr::ID && wssec_core::ns::is_wsu_ns(&a.name.namespace))
            .map(|a| a.name.namespace.clone())
    }

    fn id_attrs(&self) -> &'c [String] {
        &self.ctx.config.id_attributes
    }

    /// Rebuild the ID map after the tree changed shape.
    fn refresh_ids(&mut self) -> Result<()> {
        self.ids = self.doc.id_map(&self.ctx.config.id_attributes)?;
        Ok(())
    }

    /// Element named by `#id` or a bare `id`.
    fn lookup_id(&self, reference: &str) -> Option<NodeId> {
        let id = reference.strip_prefix('#').unwrap_or(reference);
        self.ids.get(id).copied()
    }

    /// The element's ID, preferring `wsu:Id`.
    fn element_id(&self, element: NodeId) -> Option<String> {
        self.doc
            .element_id(element, self.id_attrs())
            .map(str::to_owned)
    }

    /// First child of `parent` with local name `local` in any WS-Security
    /// namespace.
    fn wsse_child(&self, parent: NodeId, local: &str) -> Option<NodeId> {
        self.doc.child_elements(parent).find(|&c| {
            self.doc.local_name(c) == local && wssec_core::ns::is_security_ns(self.doc.namespace(c))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use wssec_core::ns::{self, node};

    use super::*;
    use crate::fixtures::{self, Encryption, Signer};

    const TIMESTAMP: &str = "<wsu:Timestamp wsu:Id=\"TS\"><wsu:Created>2024-03-01T10:00:00Z</wsu:Created></wsu:Timestamp>";

    fn context() -> ProcessorContext {
        ProcessorContext::new(ProcessorConfig::default())
            .with_key_target(Arc::new(LocalKeyTarget::new(vec![fixtures::recipient_entry()])))
            .with_certificate_resolver(Arc::new(CertificateStore::new(vec![fixtures::signer_cert()])))
            .with_key_cache(Arc::new(ShardedKeyCache::new()))
    }

    fn process(doc: Document, ctx: &ProcessorContext) -> Result<(Document, ProcessorResult)> {
        let header = fixtures::security_header(&doc);
        let mut pass = ProcessingPass::new(doc, ctx)?;
        pass.process_security_header(header)?;
        pass.finish()
    }

    fn body(doc: &Document) -> NodeId {
        let envelope = doc.document_element().unwrap();
        doc.child_elements(envelope).nth(1).unwrap()
    }

    fn thumbprint_str() -> String {
        fixtures::str_thumbprint(&fixtures::signer_cert().thumbprint_base64())
    }

    #[test]
    fn duplicate_ids_are_rejected_up_front() {
        let xml = fixtures::envelope(
            "<wsu:Timestamp wsu:Id=\"Body\"/>",
            fixtures::PAYLOAD,
        );
        let ctx = ProcessorContext::default();
        assert!(matches!(
            ProcessingPass::new(Document::parse(&xml).unwrap(), &ctx),
            Err(ProcessingError::InvalidDocumentFormat(_))
        ));
    }

    #[test]
    fn envelope_signed_then_encrypted() {
        let cek = vec![0x31; 16];
        let mut doc = fixtures::signed_body_document();
        Signer::rsa().sign(&mut doc, &[""], &thumbprint_str());
        let body_el = body(&doc);
        Encryption::new(&cek).content(&mut doc, body_el, "ED-1");
        fixtures::prepend_to_header(
            &mut doc,
            &fixtures::encrypted_key(&fixtures::recipient_cert(), &cek, "EK-1", &["#ED-1"]),
        );

        let (doc, result) = process(doc, &context()).unwrap();
        let envelope = doc.document_element().unwrap();
        assert_eq!(result.signed_elements().len(), 1);
        assert_eq!(result.signed_elements()[0].element, envelope);
        assert!(result.is_encrypted(body(&doc)));
        // The consumed EncryptedKey is gone, the signature is back.
        let header = fixtures::security_header(&doc);
        assert!(doc.child_element(header, ns::ENC, node::ENCRYPTED_KEY).is_none());
        assert!(doc.child_element(header, ns::DSIG, node::SIGNATURE).is_some());
    }

    #[test]
    fn message_for_another_recipient_passes_through() {
        let cek = vec![0x32; 16];
        let mut doc = fixtures::signed_body_document();
        Signer::rsa().sign(&mut doc, &["#Body"], &thumbprint_str());
        let body_el = body(&doc);
        Encryption::new(&cek).content(&mut doc, body_el, "ED-1");
        fixtures::prepend_to_header(
            &mut doc,
            &fixtures::encrypted_key(&fixtures::signer_cert(), &cek, "EK-1", &["#ED-1"]),
        );

        let (doc, result) = process(doc, &context()).unwrap();
        assert!(result.encryption_ignored());
        assert!(result.signed_elements().is_empty());
        assert!(result.encrypted_elements().is_empty());
        assert!(doc
            .find_descendant(body(&doc), ns::ENC, node::ENCRYPTED_DATA)
            .is_some());
    }

    #[test]
    fn signature_failure_without_skipped_encryption_is_fatal() {
        let mut doc = fixtures::signed_body_document();
        Signer::rsa().sign(&mut doc, &["#Body"], &thumbprint_str());
        let body_el = body(&doc);
        Encryption::new(&[0x33; 16]).content(&mut doc, body_el, "ED-1");
        assert!(matches!(
            process(doc, &context()),
            Err(ProcessingError::InvalidDocumentSignature(_))
        ));
    }

    #[test]
    fn later_message_keyed_by_a_cached_encrypted_key() {
        let cek = vec![0x34; 32];
        let cache = Arc::new(ShardedKeyCache::new());

        let mut first = fixtures::signed_body_document();
        fixtures::add_to_header(
            &mut first,
            &fixtures::encrypted_key(&fixtures::recipient_cert(), &cek, "EK-1", &[]),
        );
        let sha1 = fixtures::encrypted_key_sha1(&first);
        Signer::hmac(&cek).sign(&mut first, &["#Body"], &fixtures::str_encrypted_key_sha1(&sha1));
        let ctx = context().with_key_cache(cache.clone());
        let (_, result) = process(first, &ctx).unwrap();
        assert_eq!(result.signed_elements().len(), 1);
        assert!(!cache.is_empty());

        // No EncryptedKey and no private key: only the cache knows the secret.
        let mut second = fixtures::signed_body_document();
        Signer::hmac(&cek).sign(&mut second, &["#Body"], &fixtures::str_encrypted_key_sha1(&sha1));
        let ctx = ProcessorContext::default().with_key_cache(cache);
        let (doc, result) = process(second, &ctx).unwrap();
        assert_eq!(result.signed_elements().len(), 1);
        assert_eq!(result.signed_elements()[0].element, body(&doc));
        let signer = result.signed_elements()[0].signing_token;
        assert_eq!(result.token(signer).unwrap().kind(), "EncryptedKey");
    }

    #[test]
    fn signed_timestamp() {
        let mut doc = Document::parse(&fixtures::envelope(TIMESTAMP, fixtures::PAYLOAD)).unwrap();
        Signer::rsa().sign(&mut doc, &["#TS", "#Body"], &thumbprint_str());

        let (doc, result) = process(doc, &context()).unwrap();
        let ts = result.timestamp().unwrap();
        assert!(ts.is_signed());
        assert_eq!(result.signing_tokens(ts.element).len(), 1);
        assert_eq!(result.signing_tokens(body(&doc)), result.signing_tokens(ts.element));
        assert_eq!(result.wsu_ns(), Some(ns::WSU));
    }

    #[test]
    fn timestamp_signed_by_two_tokens_is_rejected() {
        let mut doc = Document::parse(&fixtures::envelope(TIMESTAMP, fixtures::PAYLOAD)).unwrap();
        fixtures::add_to_header(&mut doc, &fixtures::bst(&fixtures::signer_cert(), "X509-1"));
        fixtures::add_to_header(&mut doc, &fixtures::bst(&fixtures::expired_cert(), "X509-2"));
        // The expired certificate shares the signer's key pair.
        Signer::rsa().sign(&mut doc, &["#TS"], &fixtures::str_reference("#X509-1"));
        Signer::rsa().sign(&mut doc, &["#TS"], &fixtures::str_reference("#X509-2"));

        let ctx = ProcessorContext::new(ProcessorConfig {
            check_signing_cert_validity: false,
            ..ProcessorConfig::default()
        });
        assert!(matches!(process(doc, &ctx), Err(ProcessingError::Processor(_))));
    }
}
