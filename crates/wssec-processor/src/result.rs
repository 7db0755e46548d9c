#![forbid(unsafe_code)]

//! What one processing pass found out about a message.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use wssec_xml::NodeId;

use crate::token::{Token, TokenRef};

/// An element covered by a signature that passed core validation.
#[derive(Debug, Clone)]
pub struct SignedElement {
    pub signing_token: TokenRef,
    pub element: NodeId,
    pub signature: NodeId,
    pub signature_algorithm: String,
    pub digest_algorithms: Vec<String>,
}

/// A MIME part covered by a signature that passed core validation.
#[derive(Debug, Clone)]
pub struct SignedPart {
    pub signing_token: TokenRef,
    pub content_id: String,
}

/// An element whose content was recovered by decryption.
#[derive(Debug, Clone)]
pub struct EncryptedElement {
    pub element: NodeId,
    pub algorithm: String,
}

/// A MIME attachment a `cid:` reference may name.
#[derive(Debug, Clone)]
pub struct MimePart {
    pub content_id: String,
    pub body: Vec<u8>,
}

impl MimePart {
    pub fn new(content_id: &str, body: Vec<u8>) -> Self {
        let content_id = content_id
            .trim_start_matches('<')
            .trim_end_matches('>')
            .to_owned();
        Self { content_id, body }
    }
}

#[derive(Debug, Clone)]
pub struct Timestamp {
    pub element: NodeId,
    pub created: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
    pub(crate) signed: bool,
}

impl Timestamp {
    /// Whether exactly one token signed the timestamp. Set by
    /// `ProcessingPass::finish`.
    pub fn is_signed(&self) -> bool {
        self.signed
    }
}

#[derive(Debug, Clone)]
pub struct SignatureConfirmation {
    pub element: NodeId,
    pub value: String,
}

/// Accumulated result of one processing pass.
#[derive(Debug, Default)]
pub struct ProcessorResult {
    pub(crate) tokens: Vec<Token>,
    pub(crate) possession_proven: HashSet<TokenRef>,
    pub(crate) signed_elements: Vec<SignedElement>,
    pub(crate) signed_parts: Vec<SignedPart>,
    pub(crate) encrypted_elements: Vec<EncryptedElement>,
    pub(crate) timestamp: Option<Timestamp>,
    pub(crate) signature_confirmations: Vec<SignatureConfirmation>,
    pub(crate) validated_signature_values: Vec<String>,
    pub(crate) security_ns: Option<String>,
    pub(crate) wsu_ns: Option<String>,
    pub(crate) last_key_encryption_algorithm: Option<String>,
    pub(crate) wsse11_seen: bool,
    pub(crate) encryption_ignored: bool,
}

impl ProcessorResult {
    pub(crate) fn add_token(&mut self, token: Token) -> TokenRef {
        self.tokens.push(token);
        TokenRef(self.tokens.len() - 1)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn token(&self, token: TokenRef) -> Option<&Token> {
        self.tokens.get(token.0)
    }

    /// Whether the token produced a signature that verified.
    pub fn possession_proven(&self, token: TokenRef) -> bool {
        self.possession_proven.contains(&token)
    }

    pub fn signed_elements(&self) -> &[SignedElement] {
        &self.signed_elements
    }

    pub fn signed_parts(&self) -> &[SignedPart] {
        &self.signed_parts
    }

    pub fn encrypted_elements(&self) -> &[EncryptedElement] {
        &self.encrypted_elements
    }

    /// Tokens whose signatures cover `element`, each listed once.
    pub fn signing_tokens(&self, element: NodeId) -> Vec<TokenRef> {
        let mut out: Vec<TokenRef> = Vec::new();
        for signed in self.signed_elements.iter().filter(|s| s.element == element) {
            if !out.contains(&signed.signing_token) {
                out.push(signed.signing_token);
            }
        }
        out
    }

    pub fn is_encrypted(&self, element: NodeId) -> bool {
        self.encrypted_elements.iter().any(|e| e.element == element)
    }

    pub fn timestamp(&self) -> Option<&Timestamp> {
        self.timestamp.as_ref()
    }

    pub fn signature_confirmations(&self) -> &[SignatureConfirmation] {
        &self.signature_confirmations
    }

    /// `SignatureValue` text of every signature that verified.
    pub fn validated_signature_values(&self) -> &[String] {
        &self.validated_signature_values
    }

    /// Namespace of the `Security` header that was processed.
    pub fn security_ns(&self) -> Option<&str> {
        self.security_ns.as_deref()
    }

    /// Utility namespace used by the message.
    pub fn wsu_ns(&self) -> Option<&str> {
        self.wsu_ns.as_deref()
    }

    pub fn last_key_encryption_algorithm(&self) -> Option<&str> {
        self.last_key_encryption_algorithm.as_deref()
    }

    /// Whether any WS-Security 1.1 construct was seen.
    pub fn wsse11_seen(&self) -> bool {
        self.wsse11_seen
    }

    /// Whether an `EncryptedKey` addressed to someone else was skipped.
    pub fn encryption_ignored(&self) -> bool {
        self.encryption_ignored
    }
}
