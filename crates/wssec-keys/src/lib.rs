#![forbid(unsafe_code)]

//! Certificates and keys for WS-Security processing.
//!
//! Provides an [`X509Certificate`] wrapper exposing the identifiers security
//! token references use (thumbprint, SKI, issuer + serial), distinguished
//! name comparison, and PEM/DER loading of certificates and RSA private keys.

pub mod dn;
pub mod key;
pub mod loader;
pub mod x509;

pub use dn::DistinguishedName;
pub use key::PrivateKeyEntry;
pub use rsa::BigUint;
pub use x509::X509Certificate;
