#![forbid(unsafe_code)]

//! Signature methods: RSA PKCS#1 v1.5, ECDSA and HMAC.
//!
//! Verification is what the processor needs. Signing exists so test
//! messages can be produced with the same code paths.

use digest::core_api::BlockSizeUser;
use digest::Digest;
use hmac::{Mac, SimpleHmac};
use signature::{Signer, Verifier};
use wssec_core::{algorithm, Error};

use crate::digest::HashFunction;

/// Key material for signature operations.
#[derive(Clone)]
pub enum SigningKey {
    Rsa(rsa::RsaPrivateKey),
    RsaPublic(rsa::RsaPublicKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP256Public(p256::ecdsa::VerifyingKey),
    EcP384(p384::ecdsa::SigningKey),
    EcP384Public(p384::ecdsa::VerifyingKey),
    Hmac(Vec<u8>),
}

impl SigningKey {
    fn kind(&self) -> &'static str {
        match self {
            Self::Rsa(_) | Self::RsaPublic(_) => "RSA",
            Self::EcP256(_) | Self::EcP256Public(_) => "EC P-256",
            Self::EcP384(_) | Self::EcP384Public(_) => "EC P-384",
            Self::Hmac(_) => "HMAC",
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey({})", self.kind())
    }
}

/// Trait for signature algorithms.
pub trait SignatureAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error>;
    /// `Ok(false)` means the value does not match. Errors are reserved for
    /// a key of the wrong kind or a malformed signature value.
    fn verify(&self, key: &SigningKey, data: &[u8], signature: &[u8]) -> Result<bool, Error>;
}

#[derive(Debug, Clone, Copy)]
enum Curve {
    P256,
    P384,
}

#[derive(Debug, Clone, Copy)]
enum Scheme {
    RsaPkcs1(HashFunction),
    Ecdsa(Curve),
    Hmac(HashFunction),
}

const METHODS: &[(&str, Scheme)] = &[
    (algorithm::RSA_SHA1, Scheme::RsaPkcs1(HashFunction::Sha1)),
    (algorithm::RSA_SHA256, Scheme::RsaPkcs1(HashFunction::Sha256)),
    (algorithm::RSA_SHA384, Scheme::RsaPkcs1(HashFunction::Sha384)),
    (algorithm::RSA_SHA512, Scheme::RsaPkcs1(HashFunction::Sha512)),
    (algorithm::ECDSA_SHA256, Scheme::Ecdsa(Curve::P256)),
    (algorithm::ECDSA_SHA384, Scheme::Ecdsa(Curve::P384)),
    (algorithm::HMAC_SHA1, Scheme::Hmac(HashFunction::Sha1)),
    (algorithm::HMAC_SHA256, Scheme::Hmac(HashFunction::Sha256)),
    (algorithm::HMAC_SHA384, Scheme::Hmac(HashFunction::Sha384)),
    (algorithm::HMAC_SHA512, Scheme::Hmac(HashFunction::Sha512)),
];

struct Method {
    uri: &'static str,
    scheme: Scheme,
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    METHODS
        .iter()
        .find(|(u, _)| *u == uri)
        .map(|&(uri, scheme)| Box::new(Method { uri, scheme }) as Box<dyn SignatureAlgorithm>)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("signature algorithm: {uri}")))
}

impl SignatureAlgorithm for Method {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        match (self.scheme, key) {
            (Scheme::RsaPkcs1(hash), SigningKey::Rsa(sk)) => sk
                .sign(pkcs1v15(hash), &hash.hash(data))
                .map_err(|e| Error::Crypto(format!("RSA signing failed: {e}"))),
            (Scheme::Ecdsa(Curve::P256), SigningKey::EcP256(sk)) => {
                let sig: p256::ecdsa::Signature = sk
                    .try_sign(data)
                    .map_err(|e| Error::Crypto(format!("P-256 signing failed: {e}")))?;
                Ok(sig.to_bytes().to_vec())
            }
            (Scheme::Ecdsa(Curve::P384), SigningKey::EcP384(sk)) => {
                let sig: p384::ecdsa::Signature = sk
                    .try_sign(data)
                    .map_err(|e| Error::Crypto(format!("P-384 signing failed: {e}")))?;
                Ok(sig.to_bytes().to_vec())
            }
            (Scheme::Hmac(hash), SigningKey::Hmac(secret)) => hmac_tag(hash, secret, data),
            _ => Err(self.wrong_key(key)),
        }
    }

    fn verify(&self, key: &SigningKey, data: &[u8], sig: &[u8]) -> Result<bool, Error> {
        match (self.scheme, key) {
            (Scheme::RsaPkcs1(hash), SigningKey::RsaPublic(pk)) => {
                Ok(pk.verify(pkcs1v15(hash), &hash.hash(data), sig).is_ok())
            }
            (Scheme::RsaPkcs1(hash), SigningKey::Rsa(sk)) => Ok(sk
                .to_public_key()
                .verify(pkcs1v15(hash), &hash.hash(data), sig)
                .is_ok()),
            (Scheme::Ecdsa(Curve::P256), SigningKey::EcP256Public(vk)) => {
                verify_p256(vk, data, sig)
            }
            (Scheme::Ecdsa(Curve::P256), SigningKey::EcP256(sk)) => {
                verify_p256(sk.verifying_key(), data, sig)
            }
            (Scheme::Ecdsa(Curve::P384), SigningKey::EcP384Public(vk)) => {
                verify_p384(vk, data, sig)
            }
            (Scheme::Ecdsa(Curve::P384), SigningKey::EcP384(sk)) => {
                verify_p384(sk.verifying_key(), data, sig)
            }
            (Scheme::Hmac(hash), SigningKey::Hmac(secret)) => hmac_check(hash, secret, data, sig),
            _ => Err(self.wrong_key(key)),
        }
    }
}

impl Method {
    fn wrong_key(&self, key: &SigningKey) -> Error {
        Error::Key(format!("{} key cannot be used with {}", key.kind(), self.uri))
    }
}

fn pkcs1v15(hash: HashFunction) -> rsa::Pkcs1v15Sign {
    match hash {
        HashFunction::Sha1 => rsa::Pkcs1v15Sign::new::<sha1::Sha1>(),
        HashFunction::Sha256 => rsa::Pkcs1v15Sign::new::<sha2::Sha256>(),
        HashFunction::Sha384 => rsa::Pkcs1v15Sign::new::<sha2::Sha384>(),
        HashFunction::Sha512 => rsa::Pkcs1v15Sign::new::<sha2::Sha512>(),
    }
}

// XML-DSig carries ECDSA signatures as the raw r || s concatenation.

fn verify_p256(vk: &p256::ecdsa::VerifyingKey, data: &[u8], rs: &[u8]) -> Result<bool, Error> {
    let sig = p256::ecdsa::Signature::from_slice(rs).map_err(|_| {
        Error::Crypto(format!("P-256 signature must be 64 bytes of r || s, got {}", rs.len()))
    })?;
    Ok(vk.verify(data, &sig).is_ok())
}

fn verify_p384(vk: &p384::ecdsa::VerifyingKey, data: &[u8], rs: &[u8]) -> Result<bool, Error> {
    let sig = p384::ecdsa::Signature::from_slice(rs).map_err(|_| {
        Error::Crypto(format!("P-384 signature must be 96 bytes of r || s, got {}", rs.len()))
    })?;
    Ok(vk.verify(data, &sig).is_ok())
}

// ── HMAC ─────────────────────────────────────────────────────────────

fn hmac_tag(hash: HashFunction, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    match hash {
        HashFunction::Sha1 => keyed::<sha1::Sha1>(key, data).map(|m| m.finalize().into_bytes().to_vec()),
        HashFunction::Sha256 => keyed::<sha2::Sha256>(key, data).map(|m| m.finalize().into_bytes().to_vec()),
        HashFunction::Sha384 => keyed::<sha2::Sha384>(key, data).map(|m| m.finalize().into_bytes().to_vec()),
        HashFunction::Sha512 => keyed::<sha2::Sha512>(key, data).map(|m| m.finalize().into_bytes().to_vec()),
    }
}

/// Compare a possibly truncated HMAC output in constant time. Outputs
/// shorter than half the hash length, or 80 bits, are refused.
fn hmac_check(hash: HashFunction, key: &[u8], data: &[u8], tag: &[u8]) -> Result<bool, Error> {
    let min_len = (hash.output_len() / 2).max(10);
    if tag.len() < min_len || tag.len() > hash.output_len() {
        return Err(Error::Crypto(format!("HMAC output truncated to {} bytes", tag.len())));
    }
    let matches = match hash {
        HashFunction::Sha1 => keyed::<sha1::Sha1>(key, data)?.verify_truncated_left(tag),
        HashFunction::Sha256 => keyed::<sha2::Sha256>(key, data)?.verify_truncated_left(tag),
        HashFunction::Sha384 => keyed::<sha2::Sha384>(key, data)?.verify_truncated_left(tag),
        HashFunction::Sha512 => keyed::<sha2::Sha512>(key, data)?.verify_truncated_left(tag),
    };
    Ok(matches.is_ok())
}

fn keyed<D: Digest + BlockSizeUser>(key: &[u8], data: &[u8]) -> Result<SimpleHmac<D>, Error> {
    let mut mac = <SimpleHmac<D> as Mac>::new_from_slice(key)
        .map_err(|e| Error::Key(format!("HMAC key: {e}")))?;
    Mac::update(&mut mac, data);
    Ok(mac)
}
