#![forbid(unsafe_code)]

//! XML-DSig verification of signatures in a `wsse:Security` header.
//!
//! Processing order:
//! 1. Resolve the signing key from `KeyInfo` (unresolvable keys are ignored,
//!    not failed)
//! 2. Canonicalize `SignedInfo` in place
//! 3. Take the `Signature` out of the header, and for signatures over the
//!    whole envelope or the header also the `EncryptedKey`s already consumed,
//!    so the tree matches what the signer saw
//! 4. For each `Reference`: resolve URI, run transforms, compute digest,
//!    compare
//! 5. Verify `SignatureValue`
//! 6. Put the `Signature` back and record what it covered

use tracing::{debug, info, warn};
use wssec_c14n::C14nMode;
use wssec_core::ns::{self, node};
use wssec_core::{algorithm, Error};
use wssec_crypto::{digest, sign, SigningKey};
use wssec_transforms::uri::{self, ReferenceUri};
use wssec_transforms::{
    AttachmentContentTransform, C14nTransform, EnvelopedSignatureTransform, StrTransform,
    TransformData, TransformPipeline,
};
use wssec_xml::{Document, NodeId};

use crate::error::{IgnoreReason, Outcome, ProcessingError, Result};
use crate::result::{SignedElement, SignedPart};
use crate::token::{Token, TokenRef};
use crate::ProcessingPass;

/// A `ds:Reference`, read before the tree is rearranged.
struct ReferenceSpec {
    uri: String,
    transforms: Vec<(String, NodeId)>,
    digest_method: String,
    digest_value: Vec<u8>,
}

impl ProcessingPass<'_> {
    /// Verify `signature`, which sits in (or belongs to) the security
    /// `header`.
    ///
    /// A signature whose key cannot be resolved is `Ignored`, as is a
    /// failing signature when this pass skipped encryption addressed to
    /// someone else (the signed content may still be encrypted).
    pub fn verify_signature(&mut self, header: NodeId, signature: NodeId) -> Result<Outcome> {
        if self.security_header.is_none() {
            self.security_header = Some(header);
            self.result.security_ns = Some(self.doc.namespace(header).to_owned());
        }

        let signed_info = self
            .doc
            .child_element(signature, ns::DSIG, node::SIGNED_INFO)
            .ok_or_else(|| {
                ProcessingError::InvalidDocumentFormat("Signature has no SignedInfo".into())
            })?;
        let key_info = self
            .doc
            .child_element(signature, ns::DSIG, node::KEY_INFO)
            .ok_or_else(|| ProcessingError::Processor("Signature has no KeyInfo".into()))?;
        let signature_value = self
            .doc
            .child_element(signature, ns::DSIG, node::SIGNATURE_VALUE)
            .and_then(|el| self.doc.trimmed_text(el))
            .ok_or_else(|| {
                ProcessingError::InvalidDocumentFormat("Signature has no SignatureValue".into())
            })?;
        let method = self
            .doc
            .child_element(signed_info, ns::DSIG, node::SIGNATURE_METHOD)
            .and_then(|el| self.doc.attribute(el, ns::attr::ALGORITHM))
            .ok_or_else(|| {
                ProcessingError::InvalidDocumentFormat(
                    "SignedInfo has no SignatureMethod Algorithm".into(),
                )
            })?
            .to_owned();

        // 1. Signing key
        let Some(token) = self.resolve_key_info(key_info)? else {
            info!("signing key cannot be resolved; signature not evaluated");
            return Ok(Outcome::Ignored(IgnoreReason::KeyUnresolved));
        };
        if let Some(str_el) = self.wsse_child(key_info, node::SECURITY_TOKEN_REFERENCE) {
            self.process_security_token_reference(str_el, false)?;
        }
        let key = self.verification_key(token)?;

        // 2. SignedInfo, while the Signature is still in place
        let c14n_method = self
            .doc
            .child_element(signed_info, ns::DSIG, node::CANONICALIZATION_METHOD)
            .ok_or_else(|| {
                ProcessingError::InvalidDocumentFormat("SignedInfo has no CanonicalizationMethod".into())
            })?;
        let (c14n_mode, prefixes) = c14n_params(&self.doc, c14n_method)?;
        let signed_info_c14n =
            wssec_c14n::canonicalize_subtree(&self.doc, signed_info, c14n_mode, &prefixes)?;

        let references = self.read_references(signed_info)?;
        for r in &references {
            if r.transforms.iter().any(|(alg, _)| alg == algorithm::STR_TRANSFORM) {
                if let Some(str_el) = self.lookup_id(&r.uri) {
                    self.process_security_token_reference(str_el, false)?;
                }
            }
        }

        // 3. Take the Signature out of the header for the digests
        let in_header = self.doc.parent(signature) == Some(header);
        let next_sibling = self.doc.next_sibling(signature);
        if in_header {
            self.doc.detach(signature);
        }
        if self.envelops(header, &references) {
            self.detach_consumed_keys();
        }

        // 4-5
        let checked = self.check_signature(signature, &references, &method, &key, &signature_value, &signed_info_c14n);

        if in_header {
            let anchor = next_sibling.filter(|&n| self.doc.parent(n) == Some(header));
            self.doc.insert_before(header, signature, anchor);
        }

        match checked? {
            None => {}
            Some(reason) if self.result.encryption_ignored => {
                info!(%reason, "signature does not verify over content left encrypted; passing through");
                return Ok(Outcome::Ignored(IgnoreReason::EncryptionPassThrough));
            }
            Some(reason) => {
                warn!(%reason, "signature verification failed");
                return Err(ProcessingError::InvalidDocumentSignature(reason));
            }
        }

        // 6. Record
        self.record_signed(token, signature, &method, &references)?;
        self.result.validated_signature_values.push(signature_value);
        self.result.possession_proven.insert(token);
        debug!(references = references.len(), algorithm = %method, "signature verified");
        Ok(Outcome::Verified)
    }

    /// The key a token verifies with. Certificates are checked for validity
    /// first unless the configuration turns that off.
    fn verification_key(&mut self, token: TokenRef) -> Result<SigningKey> {
        if let Some(Token::X509(t)) = self.result.token(token) {
            if self.ctx.config.check_signing_cert_validity {
                t.certificate.check_validity().map_err(|e| {
                    ProcessingError::Processor(format!("signing certificate is not valid: {e}"))
                })?;
            }
            return Ok(t.certificate.verification_key()?);
        }
        let secret = self.secret_key(token)?;
        Ok(SigningKey::Hmac(secret.as_bytes().to_vec()))
    }

    fn read_references(&self, signed_info: NodeId) -> Result<Vec<ReferenceSpec>> {
        let doc = &self.doc;
        let mut out = Vec::new();
        for reference in doc
            .child_elements(signed_info)
            .filter(|&r| doc.is_named(r, ns::DSIG, node::REFERENCE))
        {
            let uri = doc.attribute(reference, ns::attr::URI).unwrap_or("").to_owned();
            let transforms = doc
                .child_element(reference, ns::DSIG, node::TRANSFORMS)
                .map(|list| {
                    doc.child_elements(list)
                        .filter(|&t| doc.is_named(t, ns::DSIG, node::TRANSFORM))
                        .map(|t| {
                            let alg = doc.attribute(t, ns::attr::ALGORITHM).unwrap_or("");
                            (alg.to_owned(), t)
                        })
                        .collect()
                })
                .unwrap_or_default();
            let digest_method = doc
                .child_element(reference, ns::DSIG, node::DIGEST_METHOD)
                .and_then(|el| doc.attribute(el, ns::attr::ALGORITHM))
                .ok_or_else(|| {
                    ProcessingError::InvalidDocumentFormat(format!(
                        "Reference {uri} has no DigestMethod Algorithm"
                    ))
                })?
                .to_owned();
            let digest_value = doc
                .child_element(reference, ns::DSIG, node::DIGEST_VALUE)
                .map(|el| doc.text_content(el))
                .ok_or_else(|| {
                    ProcessingError::InvalidDocumentFormat(format!(
                        "Reference {uri} has no DigestValue"
                    ))
                })?;
            out.push(ReferenceSpec {
                transforms,
                digest_method,
                digest_value: wssec_core::decode_base64_text(&digest_value)?,
                uri,
            });
        }
        if out.is_empty() {
            return Err(ProcessingError::InvalidDocumentFormat(
                "SignedInfo has no Reference".into(),
            ));
        }
        Ok(out)
    }

    /// Whether a reference covers the whole envelope or the security header.
    fn envelops(&self, header: NodeId, references: &[ReferenceSpec]) -> bool {
        let document_element = self.doc.document_element();
        references.iter().any(|r| match ReferenceUri::parse(&r.uri) {
            ReferenceUri::WholeDocument => true,
            ReferenceUri::SameDocument(id) => self
                .ids
                .get(id)
                .is_some_and(|&t| t == header || Some(t) == document_element),
            ReferenceUri::Attachment(_) | ReferenceUri::External(_) => false,
        })
    }

    /// Detach every processed `EncryptedKey` still in the tree and forget
    /// the IDs inside them.
    fn detach_consumed_keys(&mut self) {
        let keys: Vec<NodeId> = self
            .consumed_keys
            .iter()
            .copied()
            .filter(|&k| self.doc.is_attached(k))
            .collect();
        if keys.is_empty() {
            return;
        }
        for &k in &keys {
            self.doc.detach(k);
        }
        let doc = &self.doc;
        self.ids
            .retain(|_, n| !keys.iter().any(|&k| doc.is_ancestor_or_self(k, *n)));
        debug!(count = keys.len(), "processed EncryptedKeys removed before digesting");
    }

    /// Digest every reference, then the signature value. `Some(reason)`
    /// when the signature does not verify.
    fn check_signature(
        &self,
        signature: NodeId,
        references: &[ReferenceSpec],
        method: &str,
        key: &SigningKey,
        signature_value: &str,
        signed_info_c14n: &[u8],
    ) -> Result<Option<String>> {
        for r in references {
            let input = self.reference_input(&r.uri)?;
            let pipeline = self.build_pipeline(signature, r)?;
            let data = pipeline.digest_input(input)?;
            let computed = digest::digest(&r.digest_method, &data)?;
            if computed != r.digest_value {
                return Ok(Some(format!(
                    "URI={}: expected digest does not match computed digest",
                    r.uri
                )));
            }
        }

        let signature_bytes = wssec_core::decode_base64_text(signature_value)?;
        let algorithm = sign::from_uri(method)?;
        if algorithm.verify(key, signed_info_c14n, &signature_bytes)? {
            Ok(None)
        } else {
            Ok(Some("signature value verification failed".into()))
        }
    }

    fn reference_input(&self, reference_uri: &str) -> Result<TransformData<'_>> {
        match ReferenceUri::parse(reference_uri) {
            ReferenceUri::Attachment(cid) => {
                let part = self
                    .parts
                    .iter()
                    .find(|p| p.content_id == cid)
                    .ok_or_else(|| {
                        ProcessingError::InvalidDocumentFormat(format!(
                            "no attachment with Content-ID {cid}"
                        ))
                    })?;
                Ok(TransformData::Binary(part.body.clone()))
            }
            ReferenceUri::External(u) => Err(ProcessingError::InvalidDocumentFormat(format!(
                "external reference not supported: {u}"
            ))),
            ReferenceUri::WholeDocument | ReferenceUri::SameDocument(_) => {
                Ok(uri::resolve_same_document(reference_uri, &self.doc, &self.ids)?)
            }
        }
    }

    fn build_pipeline(&self, signature: NodeId, r: &ReferenceSpec) -> Result<TransformPipeline> {
        let mut pipeline = TransformPipeline::new();
        for (alg, el) in &r.transforms {
            match alg.as_str() {
                algorithm::ENVELOPED_SIGNATURE => {
                    pipeline.push(Box::new(EnvelopedSignatureTransform::new(signature)));
                }
                algorithm::STR_TRANSFORM => {
                    let token = self
                        .lookup_id(&r.uri)
                        .and_then(|str_el| self.str_to_target.get(&str_el).copied())
                        .ok_or_else(|| {
                            ProcessingError::InvalidDocumentFormat(format!(
                                "STR-Transform reference {} does not name a token",
                                r.uri
                            ))
                        })?;
                    let c14n_method = self
                        .wsse_child(*el, node::TRANSFORMATION_PARAMETERS)
                        .and_then(|p| {
                            self.doc
                                .child_element(p, ns::DSIG, node::CANONICALIZATION_METHOD)
                        })
                        .ok_or_else(|| {
                            ProcessingError::InvalidDocumentFormat(
                                "STR-Transform has no TransformationParameters/CanonicalizationMethod"
                                    .into(),
                            )
                        })?;
                    let (mode, prefixes) = c14n_params(&self.doc, c14n_method)?;
                    pipeline.push(Box::new(StrTransform::new(token, mode, prefixes)));
                }
                algorithm::ATTACHMENT_CONTENT_TRANSFORM => {
                    pipeline.push(Box::new(AttachmentContentTransform));
                }
                other => match C14nMode::from_uri(other) {
                    Some(mode) => {
                        let prefixes = inclusive_prefixes(&self.doc, *el);
                        pipeline.push(Box::new(C14nTransform::new(mode, prefixes)));
                    }
                    None => {
                        return Err(Error::UnsupportedAlgorithm(format!("transform: {other}")).into())
                    }
                },
            }
        }
        Ok(pipeline)
    }

    fn record_signed(
        &mut self,
        token: TokenRef,
        signature: NodeId,
        method: &str,
        references: &[ReferenceSpec],
    ) -> Result<()> {
        let mut digest_algorithms: Vec<String> = Vec::new();
        for r in references {
            if !digest_algorithms.contains(&r.digest_method) {
                digest_algorithms.push(r.digest_method.clone());
            }
        }
        for r in references {
            let element = match ReferenceUri::parse(&r.uri) {
                ReferenceUri::Attachment(cid) => {
                    self.result.signed_parts.push(SignedPart {
                        signing_token: token,
                        content_id: cid.to_owned(),
                    });
                    continue;
                }
                ReferenceUri::WholeDocument => self.doc.document_element(),
                ReferenceUri::SameDocument(_) => self.lookup_id(&r.uri).map(|el| {
                    self.str_to_target.get(&el).copied().unwrap_or(el)
                }),
                ReferenceUri::External(_) => continue,
            };
            let element = element.ok_or_else(|| {
                ProcessingError::InvalidDocumentFormat(format!(
                    "signed reference {} no longer resolves",
                    r.uri
                ))
            })?;
            self.result.signed_elements.push(SignedElement {
                signing_token: token,
                element,
                signature,
                signature_algorithm: method.to_owned(),
                digest_algorithms: digest_algorithms.clone(),
            });
        }
        Ok(())
    }
}

/// Mode and PrefixList of a `CanonicalizationMethod` element.
fn c14n_params(doc: &Document, method: NodeId) -> Result<(C14nMode, Vec<String>)> {
    let uri = doc.attribute(method, ns::attr::ALGORITHM).unwrap_or("");
    let mode = C14nMode::from_uri(uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("C14N: {uri}")))?;
    Ok((mode, inclusive_prefixes(doc, method)))
}

fn inclusive_prefixes(doc: &Document, el: NodeId) -> Vec<String> {
    doc.child_element(el, ns::EXC_C14N, node::INCLUSIVE_NAMESPACES)
        .and_then(|inc| doc.attribute(inc, ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}
