#![forbid(unsafe_code)]

//! Processor context: configuration and shared collaborators.

use std::sync::Arc;

use wssec_core::algorithm;

use crate::cache::EncryptedKeyCache;
use crate::collaborators::{CertificateResolver, PrivateKeyTargetResolver, SecurityContextFinder};

/// Processing options.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Reject signatures made with an expired or not-yet-valid certificate.
    pub check_signing_cert_validity: bool,
    /// Additional ID attribute names to register.
    pub id_attributes: Vec<String>,
    /// Data encryption algorithm assumed when `EncryptionMethod` is absent.
    pub default_data_encryption_algorithm: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            check_signing_cert_validity: true,
            id_attributes: Vec::new(),
            default_data_encryption_algorithm: algorithm::AES128_CBC.to_owned(),
        }
    }
}

/// Everything a processing pass borrows: built once, shared by all passes.
#[derive(Default)]
pub struct ProcessorContext {
    pub config: ProcessorConfig,
    pub(crate) certificates: Option<Arc<dyn CertificateResolver>>,
    pub(crate) key_target: Option<Arc<dyn PrivateKeyTargetResolver>>,
    pub(crate) security_contexts: Option<Arc<dyn SecurityContextFinder>>,
    pub(crate) key_cache: Option<Arc<dyn EncryptedKeyCache>>,
}

impl ProcessorContext {
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn with_certificate_resolver(mut self, resolver: Arc<dyn CertificateResolver>) -> Self {
        self.certificates = Some(resolver);
        self
    }

    pub fn with_key_target(mut self, target: Arc<dyn PrivateKeyTargetResolver>) -> Self {
        self.key_target = Some(target);
        self
    }

    pub fn with_security_contexts(mut self, finder: Arc<dyn SecurityContextFinder>) -> Self {
        self.security_contexts = Some(finder);
        self
    }

    pub fn with_key_cache(mut self, cache: Arc<dyn EncryptedKeyCache>) -> Self {
        self.key_cache = Some(cache);
        self
    }

    /// Register an extra ID attribute name.
    pub fn add_id_attr(&mut self, name: &str) {
        self.config.id_attributes.push(name.to_owned());
    }
}

impl std::fmt::Debug for ProcessorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorContext")
            .field("config", &self.config)
            .field("certificates", &self.certificates.is_some())
            .field("key_target", &self.key_target.is_some())
            .field("security_contexts", &self.security_contexts.is_some())
            .field("key_cache", &self.key_cache.is_some())
            .finish()
    }
}
