#![forbid(unsafe_code)]

//! Local private keys that encrypted keys may be addressed to.

use crate::x509::X509Certificate;

/// An RSA private key owned by this party, with its certificate chain.
///
/// The first certificate in `chain` is the one whose public key matches.
#[derive(Clone)]
pub struct PrivateKeyEntry {
    key: rsa::RsaPrivateKey,
    chain: Vec<X509Certificate>,
}

impl PrivateKeyEntry {
    pub fn new(key: rsa::RsaPrivateKey, chain: Vec<X509Certificate>) -> Self {
        Self { key, chain }
    }

    pub fn private_key(&self) -> &rsa::RsaPrivateKey {
        &self.key
    }

    /// The end-entity certificate, if a chain was supplied.
    pub fn certificate(&self) -> Option<&X509Certificate> {
        self.chain.first()
    }

    pub fn chain(&self) -> &[X509Certificate] {
        &self.chain
    }

    /// Whether `cert` carries this entry's public key.
    pub fn matches_certificate(&self, cert: &X509Certificate) -> bool {
        cert.rsa_public_key()
            .is_some_and(|pk| pk == self.key.to_public_key())
    }
}

impl std::fmt::Debug for PrivateKeyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeyEntry")
            .field("certificate", &self.certificate())
            .finish_non_exhaustive()
    }
}
