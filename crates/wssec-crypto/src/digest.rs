#![forbid(unsafe_code)]

//! Digest algorithms, selected by `DigestMethod/@Algorithm`.

use digest::{Digest, DynDigest};
use wssec_core::{algorithm, Error};

/// Trait for digest algorithms.
pub trait DigestAlgorithm: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Vec<u8>;
    fn uri(&self) -> &'static str;
}

/// The hash functions XML-DSig and XML-Enc name. Signature methods reuse
/// this to pick the hash they are built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashFunction {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashFunction {
    pub fn from_digest_uri(uri: &str) -> Option<Self> {
        Some(match uri {
            algorithm::SHA1 => Self::Sha1,
            algorithm::SHA256 => Self::Sha256,
            algorithm::SHA384 => Self::Sha384,
            algorithm::SHA512 => Self::Sha512,
            _ => return None,
        })
    }

    pub fn digest_uri(self) -> &'static str {
        match self {
            Self::Sha1 => algorithm::SHA1,
            Self::Sha256 => algorithm::SHA256,
            Self::Sha384 => algorithm::SHA384,
            Self::Sha512 => algorithm::SHA512,
        }
    }

    pub fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    pub fn hash(self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize().into_vec()
    }

    fn hasher(self) -> Box<dyn DynDigest + Send> {
        match self {
            Self::Sha1 => Box::new(sha1::Sha1::new()),
            Self::Sha256 => Box::new(sha2::Sha256::new()),
            Self::Sha384 => Box::new(sha2::Sha384::new()),
            Self::Sha512 => Box::new(sha2::Sha512::new()),
        }
    }
}

struct Hasher {
    function: HashFunction,
    state: Box<dyn DynDigest + Send>,
}

impl DigestAlgorithm for Hasher {
    fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.state.finalize().into_vec()
    }

    fn uri(&self) -> &'static str {
        self.function.digest_uri()
    }
}

/// Create a digest algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn DigestAlgorithm>, Error> {
    let function = HashFunction::from_digest_uri(uri)
        .ok_or_else(|| Error::UnsupportedAlgorithm(format!("digest algorithm: {uri}")))?;
    Ok(Box::new(Hasher {
        function,
        state: function.hasher(),
    }))
}

/// Compute a digest in one shot.
pub fn digest(uri: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut hasher = from_uri(uri)?;
    hasher.update(data);
    Ok(hasher.finalize())
}

/// SHA-1 of `data`. Used for certificate thumbprints and `EncryptedKeySHA1`.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    sha1::Sha1::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn sha256_of_hello() {
        let result = digest(algorithm::SHA256, b"hello").unwrap();
        assert_eq!(
            hex(&result),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn sha1_helper_matches_uri_dispatch() {
        let one_shot = sha1(b"abc");
        assert_eq!(hex(&one_shot), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(digest(algorithm::SHA1, b"abc").unwrap(), one_shot.to_vec());
    }

    #[test]
    fn incremental_updates() {
        let mut hasher = from_uri(algorithm::SHA512).unwrap();
        assert_eq!(hasher.uri(), algorithm::SHA512);
        hasher.update(b"hel");
        hasher.update(b"lo");
        assert_eq!(hasher.finalize(), HashFunction::Sha512.hash(b"hello"));
    }

    #[test]
    fn output_lengths() {
        for uri in algorithm::DIGESTS {
            let f = HashFunction::from_digest_uri(uri).unwrap();
            assert_eq!(f.digest_uri(), *uri);
            assert_eq!(digest(uri, b"x").unwrap().len(), f.output_len());
        }
    }

    #[test]
    fn unknown_digest_is_unsupported() {
        let err = digest("http://www.w3.org/2001/04/xmldsig-more#md5", b"x").err();
        assert!(matches!(err, Some(Error::UnsupportedAlgorithm(_))));
    }
}
