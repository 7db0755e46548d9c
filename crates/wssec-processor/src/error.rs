#![forbid(unsafe_code)]

//! Processing errors and outcomes.
//!
//! `wssec_core::Error` describes what went wrong at the XML or crypto layer.
//! `ProcessingError` says what that means for the message.

use wssec_core::Error;

/// Fatal outcome of a processing step.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("invalid document format: {0}")]
    InvalidDocumentFormat(String),

    #[error("invalid document signature: {0}")]
    InvalidDocumentSignature(String),

    #[error("processing failed: {0}")]
    Processor(String),

    #[error("security error: {0}")]
    GeneralSecurity(String),

    #[error("unknown security context: {0}")]
    BadSecurityContext(String),
}

pub type Result<T> = std::result::Result<T, ProcessingError>;

impl From<Error> for ProcessingError {
    fn from(e: Error) -> Self {
        match e {
            Error::XmlParse(_)
            | Error::XmlStructure(_)
            | Error::MissingElement(_)
            | Error::MissingAttribute(_)
            | Error::InvalidUri(_)
            | Error::Base64(_) => ProcessingError::InvalidDocumentFormat(e.to_string()),
            Error::Crypto(_)
            | Error::Key(_)
            | Error::Certificate(_)
            | Error::UnsupportedAlgorithm(_) => ProcessingError::GeneralSecurity(e.to_string()),
            _ => ProcessingError::Processor(e.to_string()),
        }
    }
}

/// Non-fatal result of verifying a signature or decrypting an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Verified,
    Decrypted,
    Ignored(IgnoreReason),
}

impl Outcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Outcome::Ignored(_))
    }
}

/// Why a signature or encrypted element was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No signing key could be resolved from `KeyInfo`.
    KeyUnresolved,
    /// The signature failed, but an `EncryptedKey` for another recipient
    /// was seen earlier, so the message may be meant for someone else.
    EncryptionPassThrough,
    /// The governing `EncryptedKey` names a key this party does not hold.
    NotForThisRecipient,
    /// No `EncryptedKey` or cached key governs the `EncryptedData`.
    NoEncryptedKey,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IgnoreReason::KeyUnresolved => "signing key could not be resolved",
            IgnoreReason::EncryptionPassThrough => "message encrypted for another recipient",
            IgnoreReason::NotForThisRecipient => "encrypted key addressed to another recipient",
            IgnoreReason::NoEncryptedKey => "no encrypted key available",
        };
        f.write_str(s)
    }
}
