#![forbid(unsafe_code)]

//! Services the processor consults but does not own: certificate lookup,
//! local private keys, and WS-SecureConversation sessions.
//!
//! Each trait comes with a small in-memory implementation used by the CLI
//! and the tests.

use std::collections::HashMap;
use std::sync::Arc;

use wssec_keys::{BigUint, DistinguishedName, PrivateKeyEntry, X509Certificate};

use crate::cache::SecretKey;

/// Finds certificates named by key identifiers.
pub trait CertificateResolver: Send + Sync {
    /// Look up by base64 SHA-1 thumbprint.
    fn by_thumbprint(&self, thumbprint: &str) -> Option<X509Certificate>;
    /// Look up by base64 subject key identifier.
    fn by_ski(&self, ski: &str) -> Option<X509Certificate>;
    fn by_issuer_and_serial(
        &self,
        issuer: &DistinguishedName,
        serial: &BigUint,
    ) -> Option<X509Certificate>;
}

/// What an `EncryptedKey`'s `KeyInfo` says about the intended recipient.
#[derive(Debug, Clone)]
pub enum RecipientHint {
    /// No `KeyInfo`. The sender expects the recipient to know.
    Unspecified,
    Thumbprint(String),
    Ski(String),
    IssuerSerial {
        issuer: DistinguishedName,
        serial: BigUint,
    },
    /// A certificate in the message, embedded or referenced by id.
    Certificate(X509Certificate),
    /// A `KeyInfo` form this processor cannot interpret.
    Unrecognized,
}

/// Maps an `EncryptedKey` recipient to a private key owned by this party.
pub trait PrivateKeyTargetResolver: Send + Sync {
    /// `None` means the key was wrapped for someone else.
    fn resolve(&self, hint: &RecipientHint) -> Option<Arc<PrivateKeyEntry>>;
}

/// A WS-SecureConversation context known to this party.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    pub identifier: String,
    pub shared_secret: SecretKey,
}

pub trait SecurityContextFinder: Send + Sync {
    fn by_identifier(&self, identifier: &str) -> Option<SecurityContext>;
}

// ── In-memory implementations ────────────────────────────────────────

/// A fixed set of trusted certificates.
#[derive(Debug, Default)]
pub struct CertificateStore {
    certificates: Vec<X509Certificate>,
}

impl CertificateStore {
    pub fn new(certificates: Vec<X509Certificate>) -> Self {
        Self { certificates }
    }

    pub fn add(&mut self, certificate: X509Certificate) {
        self.certificates.push(certificate);
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

impl CertificateResolver for CertificateStore {
    fn by_thumbprint(&self, thumbprint: &str) -> Option<X509Certificate> {
        self.certificates
            .iter()
            .find(|c| c.thumbprint_base64() == thumbprint)
            .cloned()
    }

    fn by_ski(&self, ski: &str) -> Option<X509Certificate> {
        self.certificates
            .iter()
            .find(|c| c.ski_base64() == ski)
            .cloned()
    }

    fn by_issuer_and_serial(
        &self,
        issuer: &DistinguishedName,
        serial: &BigUint,
    ) -> Option<X509Certificate> {
        self.certificates
            .iter()
            .find(|c| c.has_issuer_serial(issuer, serial))
            .cloned()
    }
}

/// The private keys held by this party.
///
/// An `EncryptedKey` without `KeyInfo` is taken to be for the first key.
#[derive(Debug, Default)]
pub struct LocalKeyTarget {
    entries: Vec<Arc<PrivateKeyEntry>>,
}

impl LocalKeyTarget {
    pub fn new(entries: Vec<PrivateKeyEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(Arc::new).collect(),
        }
    }
}

impl PrivateKeyTargetResolver for LocalKeyTarget {
    fn resolve(&self, hint: &RecipientHint) -> Option<Arc<PrivateKeyEntry>> {
        let matches = |entry: &PrivateKeyEntry| {
            let Some(cert) = entry.certificate() else {
                return false;
            };
            match hint {
                RecipientHint::Unspecified => true,
                RecipientHint::Thumbprint(t) => cert.thumbprint_base64() == *t,
                RecipientHint::Ski(s) => cert.ski_base64() == *s,
                RecipientHint::IssuerSerial { issuer, serial } => {
                    cert.has_issuer_serial(issuer, serial)
                }
                RecipientHint::Certificate(c) => entry.matches_certificate(c),
                RecipientHint::Unrecognized => false,
            }
        };
        self.entries.iter().find(|e| matches(e)).cloned()
    }
}

/// Security contexts registered up front.
#[derive(Debug, Default)]
pub struct StaticSecurityContexts {
    contexts: HashMap<String, SecretKey>,
}

impl StaticSecurityContexts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identifier: &str, shared_secret: SecretKey) {
        self.contexts.insert(identifier.to_owned(), shared_secret);
    }
}

impl SecurityContextFinder for StaticSecurityContexts {
    fn by_identifier(&self, identifier: &str) -> Option<SecurityContext> {
        self.contexts.get(identifier).map(|secret| SecurityContext {
            identifier: identifier.to_owned(),
            shared_secret: secret.clone(),
        })
    }
}
