#![forbid(unsafe_code)]

//! In-place decryption of `xenc:EncryptedData`.
//!
//! Processing order:
//! 1. Find the `EncryptedData` (the element itself, or inside an
//!    `EncryptedHeader`/`EncryptedID`/`EncryptedAssertion` wrapper)
//! 2. Find its key: an `EncryptedKey` in `KeyInfo`, a
//!    `SecurityTokenReference`, or an `EncryptedKey` sibling
//! 3. Decrypt `CipherValue` with the `EncryptionMethod` cipher
//! 4. Parse the plaintext in the namespace context of the parent and put it
//!    where the `EncryptedData` was; a wrapper is replaced by its content

use tracing::{debug, warn};
use wssec_core::ns::{self, node};
use wssec_crypto::cipher;
use wssec_xml::{NodeId, NodeKind};

use crate::cache::SecretKey;
use crate::encrypted_key::read_cipher_value;
use crate::error::{IgnoreReason, Outcome, ProcessingError, Result};
use crate::result::EncryptedElement;
use crate::token::TokenRef;
use crate::ProcessingPass;

impl ProcessingPass<'_> {
    /// Decrypt the `EncryptedData` at or inside `container`, using whatever
    /// key it names.
    pub fn decrypt(&mut self, container: NodeId) -> Result<Outcome> {
        let enc_data = self.find_encrypted_data(container)?;

        let mut key_element = None;
        let mut token = None;
        if let Some(key_info) = self.doc.child_element(enc_data, ns::DSIG, node::KEY_INFO) {
            if let Some(ek) = self.doc.child_element(key_info, ns::ENC, node::ENCRYPTED_KEY) {
                key_element = Some(ek);
            } else if let Some(str_el) = self.wsse_child(key_info, node::SECURITY_TOKEN_REFERENCE) {
                token = self.resolve_str(str_el)?;
            }
        }
        if token.is_none() && key_element.is_none() {
            key_element = self
                .doc
                .following_elements(enc_data)
                .find(|&e| self.doc.is_named(e, ns::ENC, node::ENCRYPTED_KEY));
        }
        if let Some(ek) = key_element {
            match self.process_encrypted_key(ek)? {
                Some(t) => token = Some(t),
                None => return Ok(Outcome::Ignored(IgnoreReason::NotForThisRecipient)),
            }
        }
        let Some(token) = token else {
            warn!("EncryptedData names no key this party can use; left encrypted");
            return Ok(Outcome::Ignored(IgnoreReason::NoEncryptedKey));
        };

        let secret = self.secret_key(token)?;
        self.decrypt_element(enc_data, &secret)?;
        if let Some(ek) = key_element {
            if self.doc.parent(ek) == Some(container) {
                self.doc.detach(ek);
            }
        }
        self.refresh_ids()?;
        Ok(Outcome::Decrypted)
    }

    /// Decrypt the `EncryptedData` at or inside `target` with the key of
    /// `token`, as a `ReferenceList` directs.
    pub(crate) fn decrypt_with_token(&mut self, target: NodeId, token: TokenRef) -> Result<Outcome> {
        let enc_data = self.find_encrypted_data(target)?;
        let secret = self.secret_key(token)?;
        self.decrypt_element(enc_data, &secret)?;
        self.refresh_ids()?;
        Ok(Outcome::Decrypted)
    }

    fn find_encrypted_data(&self, container: NodeId) -> Result<NodeId> {
        if self.doc.is_named(container, ns::ENC, node::ENCRYPTED_DATA) {
            return Ok(container);
        }
        self.doc
            .child_element(container, ns::ENC, node::ENCRYPTED_DATA)
            .or_else(|| self.doc.find_descendant(container, ns::ENC, node::ENCRYPTED_DATA))
            .ok_or_else(|| {
                ProcessingError::InvalidDocumentFormat(format!(
                    "{} contains no EncryptedData",
                    self.doc.local_name(container)
                ))
            })
    }

    /// Replace `enc_data` with its plaintext and record what was recovered.
    fn decrypt_element(&mut self, enc_data: NodeId, key: &SecretKey) -> Result<Vec<NodeId>> {
        let algorithm = self
            .doc
            .child_element(enc_data, ns::ENC, node::ENCRYPTION_METHOD)
            .and_then(|m| self.doc.attribute(m, ns::attr::ALGORITHM))
            .unwrap_or(self.ctx.config.default_data_encryption_algorithm.as_str())
            .to_owned();
        let ciphertext = read_cipher_value(&self.doc, enc_data)?;

        let cipher = cipher::from_uri(&algorithm)?;
        // A wrapped key may be longer than the cipher needs.
        let key_bytes = match cipher::key_length(&algorithm) {
            Some(n) if key.len() > n => &key.as_bytes()[..n],
            _ => key.as_bytes(),
        };
        let plaintext = cipher.decrypt(key_bytes, &ciphertext).map_err(|e| {
            ProcessingError::Processor(format!("cannot decrypt EncryptedData: {e}"))
        })?;
        let text = String::from_utf8(plaintext).map_err(|_| {
            ProcessingError::Processor("decrypted content is not UTF-8".into())
        })?;

        let parent = self.doc.parent(enc_data).ok_or_else(|| {
            ProcessingError::InvalidDocumentFormat("EncryptedData is not in the document".into())
        })?;
        let wrapper = self.is_wrapper(parent);
        let only_child = self.doc.children(parent).all(|c| {
            c == enc_data || matches!(self.doc.kind(c), NodeKind::Text(t) if t.trim().is_empty())
        });

        let nodes = self
            .doc
            .import_fragment(parent, strip_xml_declaration(&text))
            .map_err(|e| ProcessingError::Processor(e.to_string()))?;
        self.doc.replace(enc_data, &nodes)?;
        debug!(algorithm = %algorithm, nodes = nodes.len(), "EncryptedData decrypted");

        if wrapper {
            let element = nodes
                .iter()
                .copied()
                .find(|&n| self.doc.is_element(n))
                .ok_or_else(|| {
                    ProcessingError::Processor(format!(
                        "{} decrypted to no element",
                        self.doc.local_name(parent)
                    ))
                })?;
            if self.doc.local_name(parent) == node::ENCRYPTED_HEADER {
                self.result.wsse11_seen = true;
            }
            self.doc.replace(parent, &[element])?;
            self.record_encrypted(element, &algorithm);
            return Ok(vec![element]);
        }

        if only_child {
            self.record_encrypted(parent, &algorithm);
        } else {
            for &n in &nodes {
                if self.doc.is_element(n) {
                    self.record_encrypted(n, &algorithm);
                }
            }
        }
        Ok(nodes)
    }

    /// `wsse11:EncryptedHeader` and the SAML 2 `EncryptedID` /
    /// `EncryptedAssertion` carry exactly one encrypted element.
    fn is_wrapper(&self, el: NodeId) -> bool {
        let namespace = self.doc.namespace(el);
        match self.doc.local_name(el) {
            node::ENCRYPTED_HEADER => namespace == ns::WSSE11,
            node::ENCRYPTED_ID | node::ENCRYPTED_ASSERTION => namespace == ns::SAML2,
            _ => false,
        }
    }

    fn record_encrypted(&mut self, element: NodeId, algorithm: &str) {
        self.result.encrypted_elements.push(EncryptedElement {
            element,
            algorithm: algorithm.to_owned(),
        });
    }
}

/// Plaintext may start with an XML declaration, which cannot appear in
/// element content.
fn strip_xml_declaration(text: &str) -> &str {
    let trimmed = text.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return &trimmed[end + 2..];
        }
    }
    text
}
