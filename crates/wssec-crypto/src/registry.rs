#![forbid(unsafe_code)]

//! Algorithm registry mapping URIs to implementations.

use crate::cipher::CipherAlgorithm;
use crate::digest::DigestAlgorithm;
use crate::keytransport::{KeyTransportAlgorithm, OaepParams};
use crate::sign::SignatureAlgorithm;
use wssec_core::{algorithm, Error};

/// Central lookup for every algorithm the processor understands.
pub struct AlgorithmRegistry;

impl AlgorithmRegistry {
    pub fn digest(uri: &str) -> Result<Box<dyn DigestAlgorithm>, Error> {
        crate::digest::from_uri(uri)
    }

    pub fn signature(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
        crate::sign::from_uri(uri)
    }

    pub fn cipher(uri: &str) -> Result<Box<dyn CipherAlgorithm>, Error> {
        crate::cipher::from_uri(uri)
    }

    pub fn key_transport(uri: &str, params: OaepParams) -> Result<Box<dyn KeyTransportAlgorithm>, Error> {
        crate::keytransport::from_uri_with_params(uri, params)
    }

    /// Every supported algorithm URI, grouped by purpose.
    pub fn supported() -> Vec<(&'static str, &'static [&'static str])> {
        vec![
            ("canonicalization", algorithm::CANONICALIZATION),
            ("digest", algorithm::DIGESTS),
            ("signature", algorithm::SIGNATURES),
            ("data encryption", algorithm::DATA_ENCRYPTION),
            ("key transport", algorithm::KEY_TRANSPORT),
            ("transform", algorithm::TRANSFORMS),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_algorithm_resolves() {
        for uri in algorithm::DIGESTS {
            assert!(AlgorithmRegistry::digest(uri).is_ok(), "{uri}");
        }
        for uri in algorithm::SIGNATURES {
            assert!(AlgorithmRegistry::signature(uri).is_ok(), "{uri}");
        }
        for uri in algorithm::DATA_ENCRYPTION {
            assert!(AlgorithmRegistry::cipher(uri).is_ok(), "{uri}");
        }
        for uri in algorithm::KEY_TRANSPORT {
            assert!(AlgorithmRegistry::key_transport(uri, OaepParams::default()).is_ok(), "{uri}");
        }
    }
}
