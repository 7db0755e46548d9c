#![forbid(unsafe_code)]

//! X.509 certificates as the processor sees them.
//!
//! A certificate is looked up by several identifiers (SHA-1 thumbprint,
//! subject key identifier, issuer + serial), so those are computed from the
//! DER encoding exactly once and kept next to the parsed structure.

use der::{Decode, Encode};
use rsa::BigUint;
use spki::ObjectIdentifier;
use wssec_core::Error;
use wssec_crypto::SigningKey;
use x509_cert::ext::pkix::SubjectKeyIdentifier;
use x509_cert::Certificate;

use crate::dn::DistinguishedName;

const SUBJECT_KEY_IDENTIFIER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.14");

/// A parsed X.509 certificate with its lookup identifiers.
#[derive(Clone)]
pub struct X509Certificate {
    der: Vec<u8>,
    cert: Certificate,
    thumbprint: [u8; 20],
    ski: Vec<u8>,
    issuer: DistinguishedName,
    subject: DistinguishedName,
    serial: BigUint,
}

impl X509Certificate {
    /// Parse a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let cert = Certificate::from_der(der)
            .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
        let tbs = &cert.tbs_certificate;

        let ski = match subject_key_identifier_extension(&cert)? {
            Some(ski) => ski,
            // No extension: RFC 5280 method (1), SHA-1 over the public key bits.
            None => wssec_crypto::digest::sha1(tbs.subject_public_key_info.subject_public_key.raw_bytes())
                .to_vec(),
        };
        let issuer = DistinguishedName::parse(&tbs.issuer.to_string())?;
        let subject = DistinguishedName::parse(&tbs.subject.to_string())?;
        let serial = BigUint::from_bytes_be(tbs.serial_number.as_bytes());

        Ok(Self {
            thumbprint: wssec_crypto::digest::sha1(der),
            der: der.to_vec(),
            cert,
            ski,
            issuer,
            subject,
            serial,
        })
    }

    /// Parse the base64 text of a `BinarySecurityToken` or `ds:X509Certificate`.
    pub fn from_base64(text: &str) -> Result<Self, Error> {
        Self::from_der(&wssec_core::decode_base64_text(text)?)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// SHA-1 over the DER encoding.
    pub fn thumbprint_sha1(&self) -> &[u8; 20] {
        &self.thumbprint
    }

    /// Base64 of [`Self::thumbprint_sha1`], as carried by a ThumbprintSHA1 KeyIdentifier.
    pub fn thumbprint_base64(&self) -> String {
        wssec_core::encode_base64(&self.thumbprint)
    }

    pub fn subject_key_identifier(&self) -> &[u8] {
        &self.ski
    }

    pub fn ski_base64(&self) -> String {
        wssec_core::encode_base64(&self.ski)
    }

    pub fn issuer(&self) -> &DistinguishedName {
        &self.issuer
    }

    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    pub fn serial_number(&self) -> &BigUint {
        &self.serial
    }

    /// Whether this certificate carries the given issuer and serial number.
    pub fn has_issuer_serial(&self, issuer: &DistinguishedName, serial: &BigUint) -> bool {
        &self.serial == serial && &self.issuer == issuer
    }

    /// Check the validity period against the current system time.
    pub fn check_validity(&self) -> Result<(), Error> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| Error::Certificate(format!("system time error: {e}")))?;
        let now = der::DateTime::from_unix_duration(now)
            .map_err(|e| Error::Certificate(format!("time conversion error: {e}")))?;
        self.check_validity_at(&now)
    }

    /// Check the validity period against `at`.
    pub fn check_validity_at(&self, at: &der::DateTime) -> Result<(), Error> {
        let validity = &self.cert.tbs_certificate.validity;
        let not_before = validity.not_before.to_date_time();
        let not_after = validity.not_after.to_date_time();

        if *at < not_before {
            return Err(Error::Certificate(format!(
                "certificate {} is not yet valid (notBefore: {not_before})",
                self.subject
            )));
        }
        if *at > not_after {
            return Err(Error::Certificate(format!(
                "certificate {} has expired (notAfter: {not_after})",
                self.subject
            )));
        }
        Ok(())
    }

    /// The subject public key as a verification key.
    pub fn verification_key(&self) -> Result<SigningKey, Error> {
        use spki::DecodePublicKey;

        let spki_der = self
            .cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))?;

        if let Ok(pk) = rsa::RsaPublicKey::from_public_key_der(&spki_der) {
            return Ok(SigningKey::RsaPublic(pk));
        }
        if let Ok(vk) = p256::ecdsa::VerifyingKey::from_public_key_der(&spki_der) {
            return Ok(SigningKey::EcP256Public(vk));
        }
        if let Ok(vk) = p384::ecdsa::VerifyingKey::from_public_key_der(&spki_der) {
            return Ok(SigningKey::EcP384Public(vk));
        }
        Err(Error::Certificate(format!(
            "unsupported public key algorithm in certificate {}",
            self.subject
        )))
    }

    /// The RSA public key, if the certificate holds one.
    pub fn rsa_public_key(&self) -> Option<rsa::RsaPublicKey> {
        match self.verification_key() {
            Ok(SigningKey::RsaPublic(pk)) => Some(pk),
            _ => None,
        }
    }
}

impl PartialEq for X509Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for X509Certificate {}

impl std::fmt::Debug for X509Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X509Certificate")
            .field("subject", &self.subject.to_string())
            .field("issuer", &self.issuer.to_string())
            .field("serial", &self.serial.to_string())
            .finish()
    }
}

fn subject_key_identifier_extension(cert: &Certificate) -> Result<Option<Vec<u8>>, Error> {
    let Some(extensions) = &cert.tbs_certificate.extensions else {
        return Ok(None);
    };
    for ext in extensions {
        if ext.extn_id == SUBJECT_KEY_IDENTIFIER {
            let ski = SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes())
                .map_err(|e| Error::Certificate(format!("malformed subject key identifier: {e}")))?;
            return Ok(Some(ski.0.as_bytes().to_vec()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_certificate_pem;

    const SIGNER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/signer.crt.pem"));
    const EXPIRED: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/expired.crt.pem"));

    #[test]
    fn identifiers() {
        let cert = load_certificate_pem(SIGNER.as_bytes()).unwrap();
        assert_eq!(cert.thumbprint_base64(), "JDTxAT0vkdY93bXD6at0+tjH+B4=");
        assert_eq!(cert.ski_base64(), "RrgOl0rRlXEatghqOpoYKpGtk8Q=");
        assert_eq!(cert.serial_number(), &BigUint::from(0x1234u32));
        let issuer = DistinguishedName::parse("O=Example Corp, CN=Gateway Test Signer").unwrap();
        assert!(cert.has_issuer_serial(&issuer, &BigUint::from(4660u32)));
        assert!(!cert.has_issuer_serial(&issuer, &BigUint::from(4661u32)));
    }

    #[test]
    fn validity_period() {
        let cert = load_certificate_pem(SIGNER.as_bytes()).unwrap();
        let before = der::DateTime::new(1999, 1, 1, 0, 0, 0).unwrap();
        assert!(cert.check_validity_at(&before).is_err());
        let during = der::DateTime::new(2050, 6, 1, 0, 0, 0).unwrap();
        cert.check_validity_at(&during).unwrap();

        let expired = load_certificate_pem(EXPIRED.as_bytes()).unwrap();
        assert!(matches!(expired.check_validity(), Err(Error::Certificate(_))));
    }

    #[test]
    fn rsa_verification_key() {
        let cert = load_certificate_pem(SIGNER.as_bytes()).unwrap();
        assert!(matches!(cert.verification_key().unwrap(), SigningKey::RsaPublic(_)));
        assert!(cert.rsa_public_key().is_some());
    }

    #[test]
    fn garbage_is_a_certificate_error() {
        assert!(matches!(X509Certificate::from_der(b"nope"), Err(Error::Certificate(_))));
    }
}
