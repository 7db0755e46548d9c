#![forbid(unsafe_code)]

//! Security tokens discovered while processing a message.
//!
//! Tokens live in the pass's result and are addressed by [`TokenRef`], so
//! signed elements and resolver caches can point at the same token without
//! sharing ownership.

use std::cell::OnceCell;

use wssec_crypto::keytransport::OaepParams;
use wssec_keys::X509Certificate;
use wssec_xml::NodeId;

use crate::cache::SecretKey;
use crate::collaborators::RecipientHint;

/// Index of a token within one [`ProcessorResult`](crate::ProcessorResult).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenRef(pub(crate) usize);

impl TokenRef {
    pub fn index(self) -> usize {
        self.0
    }
}

/// How an X.509 token came to be known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum X509Origin {
    /// Carried in the message, as a `BinarySecurityToken` or a literal
    /// `ds:X509Certificate`.
    Embedded,
    /// Found by thumbprint or SKI through the certificate resolver.
    Referenced,
    /// Found through `X509IssuerSerial`.
    IssuerSerial,
    /// The externally supplied sender certificate, matched by SKI.
    SkiFallback,
}

#[derive(Debug)]
pub struct X509Token {
    pub(crate) certificate: X509Certificate,
    pub(crate) origin: X509Origin,
    pub(crate) element: Option<NodeId>,
    pub(crate) element_id: Option<String>,
}

impl X509Token {
    pub fn certificate(&self) -> &X509Certificate {
        &self.certificate
    }

    pub fn origin(&self) -> X509Origin {
        self.origin
    }
}

/// A symmetric key wrapped for a local private key (`xenc:EncryptedKey`).
///
/// The key is unwrapped on first use; see `ProcessingPass::secret_key`.
#[derive(Debug)]
pub struct WrappedKeyToken {
    pub(crate) element: Option<NodeId>,
    pub(crate) element_id: Option<String>,
    pub(crate) ciphertext: Vec<u8>,
    pub(crate) algorithm: String,
    pub(crate) oaep: OaepParams,
    pub(crate) recipient: RecipientHint,
    pub(crate) sha1: OnceCell<String>,
    pub(crate) secret: OnceCell<SecretKey>,
}

impl WrappedKeyToken {
    pub(crate) fn new(
        element: NodeId,
        element_id: Option<String>,
        ciphertext: Vec<u8>,
        algorithm: String,
        oaep: OaepParams,
        recipient: RecipientHint,
    ) -> Self {
        Self {
            element: Some(element),
            element_id,
            ciphertext,
            algorithm,
            oaep,
            recipient,
            sha1: OnceCell::new(),
            secret: OnceCell::new(),
        }
    }

    /// A token for a key that only exists in the shared cache: an earlier
    /// message carried the `EncryptedKey`, this one refers to it by SHA-1.
    pub(crate) fn from_cache(sha1: &str, secret: SecretKey) -> Self {
        Self {
            element: None,
            element_id: None,
            ciphertext: Vec::new(),
            algorithm: String::new(),
            oaep: OaepParams::default(),
            recipient: RecipientHint::Unspecified,
            sha1: OnceCell::from(sha1.to_owned()),
            secret: OnceCell::from(secret),
        }
    }

    /// Base64 SHA-1 of the wrapped key octets, as used by the
    /// `EncryptedKeySHA1` key identifier.
    pub fn encrypted_key_sha1(&self) -> &str {
        self.sha1.get_or_init(|| {
            wssec_core::encode_base64(&wssec_crypto::digest::sha1(&self.ciphertext))
        })
    }

    /// Key transport algorithm URI. Empty for a key adopted from the cache.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn recipient(&self) -> &RecipientHint {
        &self.recipient
    }

    /// The unwrapped key, once it has been unwrapped or adopted.
    pub fn secret_key(&self) -> Option<&SecretKey> {
        self.secret.get()
    }

    pub fn is_unwrapped(&self) -> bool {
        self.secret.get().is_some()
    }
}

/// A WS-SecureConversation context (or Kerberos session) and its secret.
#[derive(Debug)]
pub struct SecurityContextToken {
    pub(crate) element: Option<NodeId>,
    pub(crate) element_id: Option<String>,
    pub(crate) context_id: String,
    pub(crate) secret: SecretKey,
}

impl SecurityContextToken {
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn shared_secret(&self) -> &SecretKey {
        &self.secret
    }
}

#[derive(Debug)]
pub enum Token {
    X509(X509Token),
    WrappedKey(WrappedKeyToken),
    SecurityContext(SecurityContextToken),
}

impl Token {
    /// The element carrying the token, if it appears in the message.
    ///
    /// Synthesized `BinarySecurityToken`s for certificates found outside the
    /// message are detached elements.
    pub fn element(&self) -> Option<NodeId> {
        match self {
            Token::X509(t) => t.element,
            Token::WrappedKey(t) => t.element,
            Token::SecurityContext(t) => t.element,
        }
    }

    pub fn element_id(&self) -> Option<&str> {
        match self {
            Token::X509(t) => t.element_id.as_deref(),
            Token::WrappedKey(t) => t.element_id.as_deref(),
            Token::SecurityContext(t) => t.element_id.as_deref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Token::X509(_) => "X.509",
            Token::WrappedKey(_) => "EncryptedKey",
            Token::SecurityContext(_) => "SecurityContext",
        }
    }

    pub fn as_x509(&self) -> Option<&X509Token> {
        match self {
            Token::X509(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_wrapped_key(&self) -> Option<&WrappedKeyToken> {
        match self {
            Token::WrappedKey(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypted_key_sha1_covers_ciphertext() {
        let mut doc = wssec_xml::Document::new();
        let el = doc.create_text("");
        let token = WrappedKeyToken::new(
            el,
            None,
            b"abc".to_vec(),
            wssec_core::algorithm::RSA_OAEP.into(),
            OaepParams::default(),
            RecipientHint::Unspecified,
        );
        // SHA-1("abc")
        assert_eq!(token.encrypted_key_sha1(), "qZk+NkcGgWq6PiVxeFDCbJzQ2J0=");
        assert!(!token.is_unwrapped());
    }

    #[test]
    fn cached_key_is_already_unwrapped() {
        let token = WrappedKeyToken::from_cache("c2hhMQ==", SecretKey::new(vec![7; 16]));
        assert_eq!(token.encrypted_key_sha1(), "c2hhMQ==");
        assert_eq!(token.secret_key().unwrap().as_bytes(), &[7; 16]);
        assert!(token.element.is_none());
    }
}
