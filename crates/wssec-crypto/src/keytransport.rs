#![forbid(unsafe_code)]

//! Key transport algorithms (RSA PKCS#1 v1.5, RSA-OAEP) used to wrap the
//! symmetric key carried by an `EncryptedKey`.

use wssec_core::{algorithm, Error};

/// Trait for key transport algorithms.
pub trait KeyTransportAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error>;
    fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>, Error>;

    /// Unwrap a content key. A transport whose failures leak padding
    /// information returns `fallback_len` random bytes instead of an error,
    /// so a bad key only shows up where the content fails to decrypt.
    fn unwrap_key(
        &self,
        private_key: &rsa::RsaPrivateKey,
        encrypted: &[u8],
        fallback_len: usize,
    ) -> Result<Vec<u8>, Error> {
        let _ = fallback_len;
        self.decrypt(private_key, encrypted)
    }
}

/// RSA-OAEP parameters read from `EncryptionMethod`.
#[derive(Debug, Clone, Default)]
pub struct OaepParams {
    /// `ds:DigestMethod` URI (default: SHA-1)
    pub digest_uri: Option<String>,
    /// `xenc11:MGF` URI (default depends on the transport URI)
    pub mgf_uri: Option<String>,
    /// Decoded `OAEPparams` label
    pub oaep_params: Option<Vec<u8>>,
}

/// Create a key transport algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn KeyTransportAlgorithm>, Error> {
    from_uri_with_params(uri, OaepParams::default())
}

/// Create a key transport algorithm from its URI with RSA-OAEP parameters.
pub fn from_uri_with_params(
    uri: &str,
    params: OaepParams,
) -> Result<Box<dyn KeyTransportAlgorithm>, Error> {
    match uri {
        algorithm::RSA_PKCS1 => Ok(Box::new(RsaPkcs1Transport)),
        algorithm::RSA_OAEP | algorithm::RSA_OAEP_ENC11 => {
            let digest = HashType::from_digest_uri(params.digest_uri.as_deref())?;
            let mgf = match params.mgf_uri.as_deref() {
                Some(m) => HashType::from_mgf_uri(m)?,
                // rsa-oaep-mgf1p fixes MGF1 to SHA-1; xmlenc11 rsa-oaep follows the digest.
                None if uri == algorithm::RSA_OAEP => HashType::Sha1,
                None => digest,
            };
            let uri = if uri == algorithm::RSA_OAEP {
                algorithm::RSA_OAEP
            } else {
                algorithm::RSA_OAEP_ENC11
            };
            Ok(Box::new(RsaOaepTransport {
                uri,
                digest,
                mgf,
                label: params.oaep_params,
            }))
        }
        _ => Err(Error::UnsupportedAlgorithm(format!("key transport: {uri}"))),
    }
}

struct RsaPkcs1Transport;

impl KeyTransportAlgorithm for RsaPkcs1Transport {
    fn uri(&self) -> &'static str {
        algorithm::RSA_PKCS1
    }

    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error> {
        public_key
            .encrypt(&mut rand::thread_rng(), rsa::Pkcs1v15Encrypt, key_data)
            .map_err(|e| Error::Crypto(format!("RSA PKCS#1 encrypt: {e}")))
    }

    fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
        private_key
            .decrypt(rsa::Pkcs1v15Encrypt, encrypted)
            .map_err(|e| Error::Crypto(format!("RSA PKCS#1 decrypt: {e}")))
    }

    fn unwrap_key(
        &self,
        private_key: &rsa::RsaPrivateKey,
        encrypted: &[u8],
        fallback_len: usize,
    ) -> Result<Vec<u8>, Error> {
        match private_key.decrypt(rsa::Pkcs1v15Encrypt, encrypted) {
            Ok(key) => Ok(key),
            Err(_) => Ok(crate::random_key(fallback_len).to_vec()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HashType {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashType {
    fn from_digest_uri(uri: Option<&str>) -> Result<Self, Error> {
        match uri {
            None | Some(algorithm::SHA1) => Ok(Self::Sha1),
            Some(algorithm::SHA256) => Ok(Self::Sha256),
            Some(algorithm::SHA384) => Ok(Self::Sha384),
            Some(algorithm::SHA512) => Ok(Self::Sha512),
            Some(other) => Err(Error::UnsupportedAlgorithm(format!("OAEP digest: {other}"))),
        }
    }

    fn from_mgf_uri(uri: &str) -> Result<Self, Error> {
        match uri {
            algorithm::MGF1_SHA1 => Ok(Self::Sha1),
            algorithm::MGF1_SHA256 => Ok(Self::Sha256),
            algorithm::MGF1_SHA384 => Ok(Self::Sha384),
            algorithm::MGF1_SHA512 => Ok(Self::Sha512),
            other => Err(Error::UnsupportedAlgorithm(format!("OAEP MGF: {other}"))),
        }
    }
}

struct RsaOaepTransport {
    uri: &'static str,
    digest: HashType,
    mgf: HashType,
    label: Option<Vec<u8>>,
}

impl RsaOaepTransport {
    fn padding(&self) -> rsa::Oaep {
        let mut padding = match self.digest {
            HashType::Sha1 => oaep_with_mgf::<sha1::Sha1>(self.mgf),
            HashType::Sha256 => oaep_with_mgf::<sha2::Sha256>(self.mgf),
            HashType::Sha384 => oaep_with_mgf::<sha2::Sha384>(self.mgf),
            HashType::Sha512 => oaep_with_mgf::<sha2::Sha512>(self.mgf),
        };
        if let Some(label) = &self.label {
            padding.label = Some(String::from_utf8_lossy(label).into_owned());
        }
        padding
    }
}

fn oaep_with_mgf<D>(mgf: HashType) -> rsa::Oaep
where
    D: 'static + digest::Digest + digest::DynDigest + Send + Sync,
{
    match mgf {
        HashType::Sha1 => rsa::Oaep::new_with_mgf_hash::<D, sha1::Sha1>(),
        HashType::Sha256 => rsa::Oaep::new_with_mgf_hash::<D, sha2::Sha256>(),
        HashType::Sha384 => rsa::Oaep::new_with_mgf_hash::<D, sha2::Sha384>(),
        HashType::Sha512 => rsa::Oaep::new_with_mgf_hash::<D, sha2::Sha512>(),
    }
}

impl KeyTransportAlgorithm for RsaOaepTransport {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn encrypt(&self, public_key: &rsa::RsaPublicKey, key_data: &[u8]) -> Result<Vec<u8>, Error> {
        public_key
            .encrypt(&mut rand::thread_rng(), self.padding(), key_data)
            .map_err(|e| Error::Crypto(format!("RSA-OAEP encrypt: {e}")))
    }

    fn decrypt(&self, private_key: &rsa::RsaPrivateKey, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
        private_key
            .decrypt(self.padding(), encrypted)
            .map_err(|e| Error::Crypto(format!("RSA-OAEP decrypt: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkcs1_padding_failure_yields_a_random_key() {
        let sk = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let pk = sk.to_public_key();
        let transport = from_uri(algorithm::RSA_PKCS1).unwrap();

        let wrapped = transport.encrypt(&pk, &[9; 16]).unwrap();
        assert_eq!(transport.unwrap_key(&sk, &wrapped, 32).unwrap(), vec![9; 16]);

        let garbage = vec![0x5c; 128];
        assert!(transport.decrypt(&sk, &garbage).is_err());
        let first = transport.unwrap_key(&sk, &garbage, 32).unwrap();
        let second = transport.unwrap_key(&sk, &garbage, 32).unwrap();
        assert_eq!(first.len(), 32);
        assert_ne!(first, second);

        // OAEP reports its failures directly.
        let oaep = from_uri(algorithm::RSA_OAEP).unwrap();
        assert!(oaep.unwrap_key(&sk, &garbage, 32).is_err());
    }

    #[test]
    fn oaep_parameters_must_match() {
        let sk = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let pk = sk.to_public_key();
        let sha256 = OaepParams {
            digest_uri: Some(algorithm::SHA256.into()),
            ..Default::default()
        };
        let enc11 = from_uri_with_params(algorithm::RSA_OAEP_ENC11, sha256.clone()).unwrap();
        let wrapped = enc11.encrypt(&pk, &[9u8; 16]).unwrap();
        assert_eq!(enc11.decrypt(&sk, &wrapped).unwrap(), vec![9u8; 16]);

        // mgf1p keeps MGF1-SHA1 even with a SHA-256 digest, so it cannot unwrap this.
        let mgf1p = from_uri_with_params(algorithm::RSA_OAEP, sha256).unwrap();
        assert!(mgf1p.decrypt(&sk, &wrapped).is_err());

        let pkcs1 = from_uri(algorithm::RSA_PKCS1).unwrap();
        let wrapped = pkcs1.encrypt(&pk, b"0123456789abcdef").unwrap();
        assert_eq!(pkcs1.decrypt(&sk, &wrapped).unwrap(), b"0123456789abcdef");
    }

    #[test]
    fn unknown_oaep_digest_is_unsupported() {
        let params = OaepParams {
            digest_uri: Some("http://www.w3.org/2001/04/xmldsig-more#md5".into()),
            ..Default::default()
        };
        assert!(matches!(
            from_uri_with_params(algorithm::RSA_OAEP, params).err(),
            Some(Error::UnsupportedAlgorithm(_))
        ));
    }
}
