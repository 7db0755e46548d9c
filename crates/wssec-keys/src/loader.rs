#![forbid(unsafe_code)]

//! Certificate and private key loading from PEM and DER.

use crate::key::PrivateKeyEntry;
use crate::x509::X509Certificate;
use wssec_core::Error;

/// Load the first certificate from PEM data.
pub fn load_certificate_pem(pem_data: &[u8]) -> Result<X509Certificate, Error> {
    load_certificates_pem(pem_data)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Key("no CERTIFICATE block in PEM data".into()))
}

/// Load every `CERTIFICATE` block from PEM data, in order.
pub fn load_certificates_pem(pem_data: &[u8]) -> Result<Vec<X509Certificate>, Error> {
    let pem_str = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))?;

    let mut certs = Vec::new();
    let mut rest = pem_str;
    while let Some(begin) = rest.find("-----BEGIN ") {
        let block = &rest[begin..];
        let close = block
            .find("-----END ")
            .and_then(|end| block[end + 9..].find("-----").map(|i| end + 9 + i + 5))
            .ok_or_else(|| Error::Key("unterminated PEM block".into()))?;
        let (label, der_bytes) = pem_rfc7468::decode_vec(block[..close].as_bytes())
            .map_err(|e| Error::Key(format!("failed to decode PEM: {e}")))?;
        if label == "CERTIFICATE" {
            certs.push(X509Certificate::from_der(&der_bytes)?);
        }
        rest = &block[close..];
    }
    Ok(certs)
}

/// Load a certificate file, PEM or DER.
pub fn load_certificate_file(path: &std::path::Path) -> Result<X509Certificate, Error> {
    let data = std::fs::read(path)?;
    if looks_like_pem(&data) {
        load_certificate_pem(&data)
    } else {
        X509Certificate::from_der(&data)
    }
}

/// Load an RSA private key from PEM (PKCS#8 or PKCS#1).
pub fn load_rsa_private_key_pem(pem_data: &[u8]) -> Result<rsa::RsaPrivateKey, Error> {
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use pkcs8::DecodePrivateKey;

    let pem_str = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))?;

    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_pem(pem_str) {
        return Ok(pk);
    }
    rsa::RsaPrivateKey::from_pkcs1_pem(pem_str)
        .map_err(|e| Error::Key(format!("failed to parse RSA private key PEM: {e}")))
}

/// Load an RSA private key from DER (PKCS#8 or PKCS#1).
pub fn load_rsa_private_key_der(der: &[u8]) -> Result<rsa::RsaPrivateKey, Error> {
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use pkcs8::DecodePrivateKey;

    if let Ok(pk) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
        return Ok(pk);
    }
    rsa::RsaPrivateKey::from_pkcs1_der(der)
        .map_err(|e| Error::Key(format!("failed to parse RSA private key DER: {e}")))
}

/// Load a private key file and pair it with its certificate chain.
///
/// The key must match the first certificate.
pub fn load_private_key_entry(
    key_path: &std::path::Path,
    chain: Vec<X509Certificate>,
) -> Result<PrivateKeyEntry, Error> {
    let data = std::fs::read(key_path)?;
    let key = if looks_like_pem(&data) {
        load_rsa_private_key_pem(&data)?
    } else {
        load_rsa_private_key_der(&data)?
    };
    let entry = PrivateKeyEntry::new(key, chain);
    if let Some(cert) = entry.certificate() {
        if !entry.matches_certificate(cert) {
            return Err(Error::Key(format!(
                "private key {} does not match certificate {}",
                key_path.display(),
                cert.subject()
            )));
        }
    }
    Ok(entry)
}

fn looks_like_pem(data: &[u8]) -> bool {
    data.windows(11).any(|w| w == b"-----BEGIN ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNER_CERT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/signer.crt.pem"));
    const SIGNER_KEY: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/signer.key.pem"));
    const RECIPIENT_CERT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/recipient.crt.pem"));

    #[test]
    fn bundle_with_several_certificates() {
        let bundle = format!("{SIGNER_CERT}\n{SIGNER_KEY}\n{RECIPIENT_CERT}");
        let certs = load_certificates_pem(bundle.as_bytes()).unwrap();
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[0].subject().component("cn"), Some("gateway test signer"));
        assert_eq!(certs[1].subject().component("cn"), Some("gateway recipient"));
    }

    #[test]
    fn key_matches_its_certificate_only() {
        let key = load_rsa_private_key_pem(SIGNER_KEY.as_bytes()).unwrap();
        let entry = PrivateKeyEntry::new(key, vec![load_certificate_pem(SIGNER_CERT.as_bytes()).unwrap()]);
        let signer = load_certificate_pem(SIGNER_CERT.as_bytes()).unwrap();
        let recipient = load_certificate_pem(RECIPIENT_CERT.as_bytes()).unwrap();
        assert!(entry.matches_certificate(&signer));
        assert!(!entry.matches_certificate(&recipient));
    }

    #[test]
    fn missing_certificate() {
        assert!(load_certificate_pem(SIGNER_KEY.as_bytes()).is_err());
        assert!(load_rsa_private_key_pem(b"garbage").is_err());
    }
}
