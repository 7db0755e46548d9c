#![forbid(unsafe_code)]

//! `xenc:EncryptedKey` processing and lazy key unwrapping.
//!
//! An `EncryptedKey` becomes a [`WrappedKeyToken`] as soon as it is seen,
//! but the RSA private-key operation only happens when something needs the
//! key. The shared [`EncryptedKeyCache`](crate::EncryptedKeyCache) is
//! consulted first and populated afterwards.

use tracing::{debug, info};
use wssec_core::ns::{self, node, value_type};
use wssec_core::{algorithm, Error};
use wssec_crypto::keytransport::{self, OaepParams};
use wssec_keys::{BigUint, DistinguishedName, X509Certificate};
use wssec_xml::{Document, NodeId};

use crate::cache::SecretKey;
use crate::collaborators::RecipientHint;
use crate::error::{ProcessingError, Result};
use crate::token::{Token, TokenRef, WrappedKeyToken};
use crate::ProcessingPass;

/// Length of the random key standing in for an RSA 1.5 key that does not
/// unwrap. Ciphers use a prefix of it.
const SUBSTITUTE_KEY_LEN: usize = 32;

impl ProcessingPass<'_> {
    /// Turn an `EncryptedKey` into a token.
    ///
    /// Returns `None` when the key was wrapped for another recipient; the
    /// pass then remembers that it saw encryption it could not undo.
    pub(crate) fn process_encrypted_key(&mut self, ek: NodeId) -> Result<Option<TokenRef>> {
        if let Some(&token) = self.index.by_element.get(&ek) {
            return Ok(Some(token));
        }
        let method = self
            .doc
            .child_element(ek, ns::ENC, node::ENCRYPTION_METHOD)
            .ok_or_else(|| {
                ProcessingError::InvalidDocumentFormat("EncryptedKey has no EncryptionMethod".into())
            })?;
        let algorithm = self
            .doc
            .attribute(method, ns::attr::ALGORITHM)
            .ok_or_else(|| {
                ProcessingError::InvalidDocumentFormat(
                    "EncryptedKey EncryptionMethod has no Algorithm".into(),
                )
            })?
            .to_owned();
        if !algorithm::KEY_TRANSPORT.contains(&algorithm.as_str()) {
            return Err(Error::UnsupportedAlgorithm(format!("key transport: {algorithm}")).into());
        }
        self.result.last_key_encryption_algorithm = Some(algorithm.clone());

        let oaep = read_oaep_params(&self.doc, method);
        let ciphertext = read_cipher_value(&self.doc, ek)?;
        let recipient = self.recipient_hint(ek)?;
        let element_id = self.element_id(ek);
        let token = WrappedKeyToken::new(ek, element_id, ciphertext, algorithm, oaep, recipient);

        let sha1 = token.encrypted_key_sha1().to_owned();
        match self.ctx.key_cache.as_ref().and_then(|c| c.get(&sha1)) {
            Some(secret) => {
                debug!(sha1 = %sha1, "EncryptedKey already unwrapped by an earlier pass");
                let _ = token.secret.set(secret);
            }
            None => {
                let ours = self
                    .ctx
                    .key_target
                    .as_ref()
                    .is_some_and(|t| t.resolve(&token.recipient).is_some());
                if !ours {
                    info!(sha1 = %sha1, "EncryptedKey is addressed to another recipient; skipping");
                    self.result.encryption_ignored = true;
                    return Ok(None);
                }
            }
        }

        let token_ref = self.register_token(Token::WrappedKey(token));
        self.index.by_encrypted_key_sha1.insert(sha1, token_ref);
        self.consumed_keys.push(ek);
        Ok(Some(token_ref))
    }

    /// The symmetric key a token provides, unwrapping it if necessary.
    pub(crate) fn secret_key(&mut self, token: TokenRef) -> Result<SecretKey> {
        let ctx = self.ctx;
        let wrapped = match self.result.tokens.get(token.index()) {
            Some(Token::WrappedKey(wk)) => wk,
            Some(Token::SecurityContext(sc)) => return Ok(sc.secret.clone()),
            Some(Token::X509(_)) | None => {
                return Err(ProcessingError::Processor(
                    "token does not provide a symmetric key".into(),
                ))
            }
        };
        if let Some(secret) = wrapped.secret.get() {
            return Ok(secret.clone());
        }

        let sha1 = wrapped.encrypted_key_sha1().to_owned();
        if let Some(secret) = ctx.key_cache.as_ref().and_then(|c| c.get(&sha1)) {
            debug!(sha1 = %sha1, "unwrapped key taken from the shared cache");
            let _ = wrapped.secret.set(secret.clone());
            return Ok(secret);
        }

        let target = ctx
            .key_target
            .as_ref()
            .and_then(|t| t.resolve(&wrapped.recipient))
            .ok_or_else(|| {
                ProcessingError::GeneralSecurity(
                    "EncryptedKey is not addressed to a key held by this party".into(),
                )
            })?;
        let transport = keytransport::from_uri_with_params(&wrapped.algorithm, wrapped.oaep.clone())?;
        let secret = SecretKey::new(transport.unwrap_key(
            target.private_key(),
            &wrapped.ciphertext,
            SUBSTITUTE_KEY_LEN,
        )?);
        debug!(sha1 = %sha1, algorithm = %wrapped.algorithm, "EncryptedKey unwrapped");

        if let Some(cache) = ctx.key_cache.as_ref() {
            cache.put(&sha1, secret.clone());
        }
        let _ = wrapped.secret.set(secret.clone());
        Ok(secret)
    }

    /// What the `EncryptedKey`'s `KeyInfo` says about its recipient.
    fn recipient_hint(&self, ek: NodeId) -> Result<RecipientHint> {
        let Some(key_info) = self.doc.child_element(ek, ns::DSIG, node::KEY_INFO) else {
            return Ok(RecipientHint::Unspecified);
        };
        if let Some(str_el) = self.wsse_child(key_info, node::SECURITY_TOKEN_REFERENCE) {
            if let Some(key_id) = self.wsse_child(str_el, node::KEY_IDENTIFIER) {
                let vt = self.doc.attribute(key_id, ns::attr::VALUE_TYPE).unwrap_or("");
                let Some(value) = self.doc.trimmed_text(key_id) else {
                    return Ok(RecipientHint::Unrecognized);
                };
                return Ok(if value_type::matches(vt, value_type::SKI_SUFFIX) {
                    RecipientHint::Ski(value)
                } else if value_type::matches(vt, value_type::THUMBPRINT_SHA1_SUFFIX) {
                    RecipientHint::Thumbprint(value)
                } else {
                    RecipientHint::Unrecognized
                });
            }
            if let Some(reference) = self.wsse_child(str_el, node::WSSE_REFERENCE) {
                let uri = self.doc.attribute(reference, ns::attr::URI).unwrap_or("");
                return match self.lookup_id(uri) {
                    Some(bst) if self.doc.local_name(bst) == node::BINARY_SECURITY_TOKEN => {
                        let cert = X509Certificate::from_base64(&self.doc.text_content(bst))?;
                        Ok(RecipientHint::Certificate(cert))
                    }
                    _ => Ok(RecipientHint::Unrecognized),
                };
            }
            if let Some(x509_data) = self.doc.child_element(str_el, ns::DSIG, node::X509_DATA) {
                return self.x509_data_hint(x509_data);
            }
            return Ok(RecipientHint::Unrecognized);
        }
        if let Some(x509_data) = self.doc.child_element(key_info, ns::DSIG, node::X509_DATA) {
            return self.x509_data_hint(x509_data);
        }
        Ok(RecipientHint::Unrecognized)
    }

    fn x509_data_hint(&self, x509_data: NodeId) -> Result<RecipientHint> {
        let doc = &self.doc;
        if let Some(cert) = doc.child_element(x509_data, ns::DSIG, node::X509_CERTIFICATE) {
            let cert = X509Certificate::from_base64(&doc.text_content(cert))?;
            return Ok(RecipientHint::Certificate(cert));
        }
        if let Some(ski) = doc
            .child_element(x509_data, ns::DSIG, node::X509_SKI)
            .and_then(|el| doc.trimmed_text(el))
        {
            return Ok(RecipientHint::Ski(ski));
        }
        if let Some(issuer_serial) = doc.child_element(x509_data, ns::DSIG, node::X509_ISSUER_SERIAL)
        {
            let text = |local: &str| {
                doc.child_element(issuer_serial, ns::DSIG, local)
                    .and_then(|el| doc.trimmed_text(el))
            };
            let issuer = text(node::X509_ISSUER_NAME).and_then(|s| DistinguishedName::parse(&s).ok());
            let serial = text(node::X509_SERIAL_NUMBER)
                .and_then(|s| BigUint::parse_bytes(s.as_bytes(), 10));
            if let (Some(issuer), Some(serial)) = (issuer, serial) {
                return Ok(RecipientHint::IssuerSerial { issuer, serial });
            }
        }
        Ok(RecipientHint::Unrecognized)
    }
}

/// RSA-OAEP parameters from an `EncryptionMethod`.
pub(crate) fn read_oaep_params(doc: &Document, method: NodeId) -> OaepParams {
    let mut params = OaepParams::default();
    for child in doc.child_elements(method) {
        let child_ns = doc.namespace(child);
        match doc.local_name(child) {
            node::DIGEST_METHOD if child_ns == ns::DSIG || child_ns == ns::ENC => {
                params.digest_uri = doc.attribute(child, ns::attr::ALGORITHM).map(str::to_owned);
            }
            node::RSA_MGF if child_ns == ns::ENC11 || child_ns == ns::ENC => {
                params.mgf_uri = doc.attribute(child, ns::attr::ALGORITHM).map(str::to_owned);
            }
            node::RSA_OAEP_PARAMS => {
                params.oaep_params = wssec_core::decode_base64_text(&doc.text_content(child)).ok();
            }
            _ => {}
        }
    }
    params
}

/// Decoded `CipherData/CipherValue` of an `EncryptedKey` or `EncryptedData`.
pub(crate) fn read_cipher_value(doc: &Document, encrypted: NodeId) -> Result<Vec<u8>> {
    let cipher_value = doc
        .child_element(encrypted, ns::ENC, node::CIPHER_DATA)
        .and_then(|cd| doc.child_element(cd, ns::ENC, node::CIPHER_VALUE))
        .ok_or_else(|| {
            ProcessingError::InvalidDocumentFormat(format!(
                "{} has no CipherData/CipherValue",
                doc.local_name(encrypted)
            ))
        })?;
    Ok(wssec_core::decode_base64_text(&doc.text_content(cipher_value))?)
}
