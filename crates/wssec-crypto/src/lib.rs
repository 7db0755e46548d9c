#![forbid(unsafe_code)]

//! Cryptographic primitives for WS-Security processing, selected by the
//! algorithm URIs that appear in signatures and encrypted elements:
//! digests, signatures, block ciphers and RSA key transport.

pub mod cipher;
pub mod digest;
pub mod keytransport;
pub mod registry;
pub mod sign;

pub use digest::DigestAlgorithm;
pub use registry::AlgorithmRegistry;
pub use sign::SigningKey;

/// Fill a fresh buffer of `len` bytes from the thread RNG.
///
/// Used for content-encryption keys when building encrypted messages and
/// as the stand-in for an RSA 1.5 key that fails to unwrap.
pub fn random_key(len: usize) -> zeroize::Zeroizing<Vec<u8>> {
    use rand::RngCore;
    let mut key = zeroize::Zeroizing::new(vec![0u8; len]);
    rand::thread_rng().fill_bytes(&mut key);
    key
}
