#![forbid(unsafe_code)]

//! Resolving `KeyInfo` and `SecurityTokenReference` to tokens.
//!
//! Every strategy is tried at most once per reference, and every token found
//! is cached under the identifier that found it, so a second reference to
//! the same thumbprint, SKI, issuer/serial or EncryptedKeySHA1 yields the same
//! [`TokenRef`] without consulting the collaborators again.
//!
//! Failing to find a token is not an error: it is logged and `None` comes
//! back. Malformed references (missing mandatory children, references to the
//! wrong kind of element) are `InvalidDocumentFormat`.

use std::collections::HashMap;

use tracing::{debug, info, warn};
use wssec_core::ns::{self, node, value_type};
use wssec_keys::{BigUint, DistinguishedName, X509Certificate};
use wssec_xml::{NodeId, QName};

use crate::error::{ProcessingError, Result};
use crate::token::{SecurityContextToken, Token, TokenRef, WrappedKeyToken, X509Origin, X509Token};
use crate::ProcessingPass;

/// Per-pass token caches.
#[derive(Debug, Default)]
pub(crate) struct TokenIndex {
    pub(crate) by_id: HashMap<String, TokenRef>,
    pub(crate) by_element: HashMap<NodeId, TokenRef>,
    by_thumbprint: HashMap<String, TokenRef>,
    by_ski: HashMap<String, TokenRef>,
    by_issuer_serial: HashMap<(DistinguishedName, BigUint), TokenRef>,
    pub(crate) by_encrypted_key_sha1: HashMap<String, TokenRef>,
    pub(crate) by_context_id: HashMap<String, TokenRef>,
}

impl ProcessingPass<'_> {
    /// Add a token and index it by its element and ID.
    pub(crate) fn register_token(&mut self, token: Token) -> TokenRef {
        let element = token.element();
        let id = token.element_id().map(str::to_owned);
        let token_ref = self.result.add_token(token);
        if let Some(el) = element {
            self.index.by_element.insert(el, token_ref);
        }
        if let Some(id) = id {
            self.index.by_id.entry(id).or_insert(token_ref);
        }
        token_ref
    }

    /// Resolve the token a signature's `KeyInfo` names.
    pub(crate) fn resolve_key_info(&mut self, key_info: NodeId) -> Result<Option<TokenRef>> {
        if let Some(str_el) = self.wsse_child(key_info, node::SECURITY_TOKEN_REFERENCE) {
            if let Some(token) = self.resolve_str(str_el)? {
                return Ok(Some(token));
            }
        }
        if let Some(x509_data) = self.doc.child_element(key_info, ns::DSIG, node::X509_DATA) {
            if let Some(token) = self.resolve_x509_data(None, x509_data)? {
                return Ok(Some(token));
            }
        }
        Ok(None)
    }

    /// Resolve the token a `SecurityTokenReference` names.
    pub(crate) fn resolve_str(&mut self, str_el: NodeId) -> Result<Option<TokenRef>> {
        if let Some(reference) = self.wsse_child(str_el, node::WSSE_REFERENCE) {
            return self.resolve_direct_reference(str_el, reference);
        }
        if let Some(key_id) = self.wsse_child(str_el, node::KEY_IDENTIFIER) {
            return self.resolve_key_identifier(str_el, key_id);
        }
        if let Some(x509_data) = self.doc.child_element(str_el, ns::DSIG, node::X509_DATA) {
            return self.resolve_x509_data(Some(str_el), x509_data);
        }
        debug!("SecurityTokenReference carries no supported reference form");
        Ok(None)
    }

    // ── Direct references ────────────────────────────────────────────

    fn resolve_direct_reference(
        &mut self,
        str_el: NodeId,
        reference: NodeId,
    ) -> Result<Option<TokenRef>> {
        let uri = self.doc.attribute(reference, ns::attr::URI).unwrap_or("").trim();
        if uri.is_empty() {
            warn!("wsse:Reference without a URI; ignoring");
            return Ok(None);
        }
        let id = uri.strip_prefix('#').unwrap_or(uri).to_owned();

        if let Some(&token) = self.index.by_id.get(&id) {
            self.remember_str_target(str_el, token);
            return Ok(Some(token));
        }
        if let Some(&token) = self.index.by_context_id.get(uri) {
            return Ok(Some(token));
        }

        // Not seen yet: the header pass may not have reached it, or the
        // signature is being verified on its own.
        let Some(target) = self.lookup_id(&id) else {
            info!(uri, "wsse:Reference does not resolve to any element");
            return Ok(None);
        };
        let namespace = self.doc.namespace(target).to_owned();
        let token = match self.doc.local_name(target) {
            node::BINARY_SECURITY_TOKEN if ns::is_security_ns(&namespace) => {
                self.process_binary_security_token(target)?
            }
            node::ENCRYPTED_KEY if namespace == ns::ENC => self.process_encrypted_key(target)?,
            node::SECURITY_CONTEXT_TOKEN if ns::is_wsc_ns(&namespace) => {
                Some(self.process_security_context_token(target)?)
            }
            other => {
                info!(uri, element = other, "wsse:Reference target is not a supported token");
                None
            }
        };
        if let Some(token) = token {
            self.remember_str_target(str_el, token);
        }
        Ok(token)
    }

    fn remember_str_target(&mut self, str_el: NodeId, token: TokenRef) {
        if let Some(Token::X509(t)) = self.result.token(token) {
            if let Some(el) = t.element {
                self.str_to_target.insert(str_el, el);
            }
        }
    }

    // ── KeyIdentifier ────────────────────────────────────────────────

    fn resolve_key_identifier(
        &mut self,
        str_el: NodeId,
        key_id: NodeId,
    ) -> Result<Option<TokenRef>> {
        let vt = self
            .doc
            .attribute(key_id, ns::attr::VALUE_TYPE)
            .unwrap_or("")
            .to_owned();
        let Some(value) = self.doc.trimmed_text(key_id) else {
            warn!(value_type = %vt, "empty KeyIdentifier; ignoring");
            return Ok(None);
        };

        if value_type::matches(&vt, value_type::ENCRYPTED_KEY_SHA1_SUFFIX) {
            self.resolve_encrypted_key_sha1(&value)
        } else if value_type::matches(&vt, value_type::THUMBPRINT_SHA1_SUFFIX) {
            Ok(self.resolve_thumbprint(Some(str_el), &value))
        } else if value_type::matches(&vt, value_type::SKI_SUFFIX) {
            Ok(self.resolve_ski(Some(str_el), &value))
        } else if value_type::matches(&vt, value_type::SAML_ASSERTION_ID_SUFFIX)
            || value_type::matches(&vt, value_type::SAML_ID_SUFFIX)
        {
            info!(assertion = %value, "SAML assertion keys are not supported");
            Ok(None)
        } else if value_type::matches(&vt, value_type::KERBEROS_APREQ_SHA1_SUFFIX) {
            let encoding = self
                .doc
                .attribute(key_id, ns::attr::ENCODING_TYPE)
                .map(str::to_owned);
            self.resolve_kerberos(encoding.as_deref(), &value)
        } else {
            debug!(value_type = %vt, "unsupported KeyIdentifier value type");
            Ok(None)
        }
    }

    fn resolve_thumbprint(&mut self, str_el: Option<NodeId>, thumbprint: &str) -> Option<TokenRef> {
        if let Some(&token) = self.index.by_thumbprint.get(thumbprint) {
            return Some(self.with_str_target(str_el, token));
        }
        let Some(resolver) = self.ctx.certificates.clone() else {
            warn!("no certificate resolver configured; cannot resolve thumbprint reference");
            return None;
        };
        match resolver.by_thumbprint(thumbprint) {
            Some(cert) => {
                let token = self.intern_certificate(cert, X509Origin::Referenced, str_el);
                self.index.by_thumbprint.insert(thumbprint.to_owned(), token);
                Some(token)
            }
            None => {
                info!(thumbprint, "no certificate found for thumbprint");
                None
            }
        }
    }

    fn resolve_ski(&mut self, str_el: Option<NodeId>, ski: &str) -> Option<TokenRef> {
        if let Some(&token) = self.index.by_ski.get(ski) {
            return Some(self.with_str_target(str_el, token));
        }
        if let Some(resolver) = self.ctx.certificates.clone() {
            if let Some(cert) = resolver.by_ski(ski) {
                let token = self.intern_certificate(cert, X509Origin::Referenced, str_el);
                self.index.by_ski.insert(ski.to_owned(), token);
                return Some(token);
            }
        }
        // Last resort: the sender certificate known from outside the message.
        let sender = self.sender_certificate.clone().filter(|cert| {
            wssec_core::decode_base64_text(ski)
                .is_ok_and(|bytes| bytes == cert.subject_key_identifier())
        });
        if let Some(cert) = sender {
            debug!(ski, "SKI matches the sender certificate");
            let token = self.intern_certificate(cert, X509Origin::SkiFallback, str_el);
            self.index.by_ski.insert(ski.to_owned(), token);
            return Some(token);
        }
        if self.ctx.certificates.is_none() && self.sender_certificate.is_none() {
            warn!("no certificate resolver configured; cannot resolve SKI reference");
        } else {
            info!(ski, "no certificate found for SKI");
        }
        None
    }

    /// A key identified by `EncryptedKeySHA1`: an `EncryptedKey` in this
    /// message, or one an earlier message left in the shared cache.
    fn resolve_encrypted_key_sha1(&mut self, sha1: &str) -> Result<Option<TokenRef>> {
        if let Some(&token) = self.index.by_encrypted_key_sha1.get(sha1) {
            return Ok(Some(token));
        }
        if let Some(token) = self.find_wrapped_key_by_sha1(sha1) {
            return Ok(Some(token));
        }
        if let Some(header) = self.security_header {
            let pending: Vec<NodeId> = self
                .doc
                .child_elements(header)
                .filter(|&c| self.doc.is_named(c, ns::ENC, node::ENCRYPTED_KEY))
                .filter(|c| !self.index.by_element.contains_key(c))
                .collect();
            for ek in pending {
                self.process_encrypted_key(ek)?;
            }
            if let Some(token) = self.find_wrapped_key_by_sha1(sha1) {
                return Ok(Some(token));
            }
        }
        if let Some(secret) = self.ctx.key_cache.as_ref().and_then(|c| c.get(sha1)) {
            debug!(sha1, "EncryptedKeySHA1 resolved from the shared key cache");
            let token = self.register_token(Token::WrappedKey(WrappedKeyToken::from_cache(sha1, secret)));
            self.index.by_encrypted_key_sha1.insert(sha1.to_owned(), token);
            return Ok(Some(token));
        }
        warn!(sha1, "EncryptedKeySHA1 matches no EncryptedKey and no cached key");
        Ok(None)
    }

    fn find_wrapped_key_by_sha1(&mut self, sha1: &str) -> Option<TokenRef> {
        let found = self.result.tokens.iter().position(|t| {
            matches!(t, Token::WrappedKey(wk) if wk.encrypted_key_sha1() == sha1)
        })?;
        let token = TokenRef(found);
        self.index.by_encrypted_key_sha1.insert(sha1.to_owned(), token);
        Some(token)
    }

    /// Kerberos session reference, resolved through the security context
    /// finder. Without a finder there is no way to trust the session.
    pub(crate) fn resolve_kerberos(
        &mut self,
        encoding_type: Option<&str>,
        identifier: &str,
    ) -> Result<Option<TokenRef>> {
        if !encoding_type.is_some_and(|e| value_type::matches(e, value_type::BASE64_BINARY_SUFFIX)) {
            warn!("Kerberos KeyIdentifier without Base64Binary EncodingType; ignoring");
            return Ok(None);
        }
        if let Some(&token) = self.index.by_context_id.get(identifier) {
            return Ok(Some(token));
        }
        let finder = self.ctx.security_contexts.clone().ok_or_else(|| {
            ProcessingError::Processor(
                "Kerberos reference found but no security context finder is configured".into(),
            )
        })?;
        match finder.by_identifier(identifier) {
            Some(context) => {
                let token = self.register_token(Token::SecurityContext(SecurityContextToken {
                    element: None,
                    element_id: None,
                    context_id: context.identifier,
                    secret: context.shared_secret,
                }));
                self.index.by_context_id.insert(identifier.to_owned(), token);
                Ok(Some(token))
            }
            None => {
                warn!(identifier, "Kerberos session is not known");
                Ok(None)
            }
        }
    }

    // ── X509Data ─────────────────────────────────────────────────────

    /// `ds:X509Data`, in `KeyInfo` or inside a `SecurityTokenReference`.
    fn resolve_x509_data(
        &mut self,
        str_el: Option<NodeId>,
        x509_data: NodeId,
    ) -> Result<Option<TokenRef>> {
        if let Some(cert_el) = self.doc.child_element(x509_data, ns::DSIG, node::X509_CERTIFICATE) {
            let text = self.doc.text_content(cert_el);
            let cert = X509Certificate::from_base64(&text)?;
            return Ok(Some(self.intern_certificate(cert, X509Origin::Embedded, str_el)));
        }
        if let Some(ski_el) = self.doc.child_element(x509_data, ns::DSIG, node::X509_SKI) {
            let Some(ski) = self.doc.trimmed_text(ski_el) else {
                warn!("empty X509SKI; ignoring");
                return Ok(None);
            };
            return Ok(self.resolve_ski(str_el, &ski));
        }
        if let Some(issuer_serial) =
            self.doc
                .child_element(x509_data, ns::DSIG, node::X509_ISSUER_SERIAL)
        {
            return self.resolve_issuer_serial(str_el, issuer_serial);
        }
        debug!("X509Data carries no supported child");
        Ok(None)
    }

    fn resolve_issuer_serial(
        &mut self,
        str_el: Option<NodeId>,
        issuer_serial: NodeId,
    ) -> Result<Option<TokenRef>> {
        let issuer = self
            .doc
            .child_element(issuer_serial, ns::DSIG, node::X509_ISSUER_NAME)
            .and_then(|el| self.doc.trimmed_text(el))
            .ok_or_else(|| {
                ProcessingError::InvalidDocumentFormat(
                    "X509IssuerSerial is missing X509IssuerName".into(),
                )
            })?;
        let serial = self
            .doc
            .child_element(issuer_serial, ns::DSIG, node::X509_SERIAL_NUMBER)
            .and_then(|el| self.doc.trimmed_text(el))
            .ok_or_else(|| {
                ProcessingError::InvalidDocumentFormat(
                    "X509IssuerSerial is missing X509SerialNumber".into(),
                )
            })?;

        let issuer = match DistinguishedName::parse(&issuer) {
            Ok(dn) => dn,
            Err(e) => {
                warn!(issuer = %issuer, error = %e, "unparsable X509IssuerName; ignoring reference");
                return Ok(None);
            }
        };
        let Some(serial) = BigUint::parse_bytes(serial.as_bytes(), 10) else {
            warn!(serial = %serial, "unparsable X509SerialNumber; ignoring reference");
            return Ok(None);
        };

        let key = (issuer, serial);
        if let Some(&token) = self.index.by_issuer_serial.get(&key) {
            return Ok(Some(self.with_str_target(str_el, token)));
        }
        let Some(resolver) = self.ctx.certificates.clone() else {
            warn!("no certificate resolver configured; cannot resolve issuer/serial reference");
            return Ok(None);
        };
        match resolver.by_issuer_and_serial(&key.0, &key.1) {
            Some(cert) => {
                let token = self.intern_certificate(cert, X509Origin::IssuerSerial, str_el);
                self.index.by_issuer_serial.insert(key, token);
                Ok(Some(token))
            }
            None => {
                info!(issuer = %key.0, serial = %key.1, "no certificate found for issuer/serial");
                Ok(None)
            }
        }
    }

    // ── X.509 tokens ─────────────────────────────────────────────────

    /// The token for `cert`, creating it if this certificate has not been
    /// seen in this pass. A certificate without a token element gets a
    /// synthesized `BinarySecurityToken` so STR-Transforms and signed-element
    /// substitution have something to point at.
    fn intern_certificate(
        &mut self,
        cert: X509Certificate,
        origin: X509Origin,
        str_el: Option<NodeId>,
    ) -> TokenRef {
        let thumbprint = cert.thumbprint_base64();
        if let Some(&token) = self.index.by_thumbprint.get(&thumbprint) {
            return self.with_str_target(str_el, token);
        }
        let bst = self.synthesize_bst(str_el, &cert);
        let token = self.register_token(Token::X509(X509Token {
            certificate: cert,
            origin,
            element: Some(bst),
            element_id: None,
        }));
        self.index.by_thumbprint.insert(thumbprint, token);
        if let Some(str_el) = str_el {
            self.str_to_target.insert(str_el, bst);
        }
        debug!(?origin, "X.509 token added");
        token
    }

    /// Index a certificate carried by a `BinarySecurityToken` in the message.
    pub(crate) fn index_certificate(&mut self, token: TokenRef) {
        if let Some(Token::X509(t)) = self.result.token(token) {
            let thumbprint = t.certificate.thumbprint_base64();
            self.index.by_thumbprint.entry(thumbprint).or_insert(token);
        }
    }

    fn with_str_target(&mut self, str_el: Option<NodeId>, token: TokenRef) -> TokenRef {
        if let Some(str_el) = str_el {
            self.remember_str_target(str_el, token);
        }
        token
    }

    /// A detached `BinarySecurityToken` carrying `cert`, in the namespace of
    /// the referring STR (or of the security header).
    fn synthesize_bst(&mut self, str_el: Option<NodeId>, cert: &X509Certificate) -> NodeId {
        let (prefix, namespace) = match str_el.and_then(|s| self.doc.element(s)) {
            Some(el) => (el.name.prefix.clone(), el.name.namespace.clone()),
            None => (
                "wsse".to_owned(),
                self.result
                    .security_ns
                    .clone()
                    .unwrap_or_else(|| ns::WSSE.to_owned()),
            ),
        };
        let bst = self
            .doc
            .create_element(QName::new(&prefix, node::BINARY_SECURITY_TOKEN, &namespace));
        self.doc
            .set_attribute(bst, QName::local(ns::attr::VALUE_TYPE), value_type::X509V3);
        self.doc
            .set_attribute(bst, QName::local(ns::attr::ENCODING_TYPE), value_type::BASE64_BINARY);
        let text = self.doc.create_text(&wssec_core::encode_base64(cert.der()));
        self.doc.append_child(bst, text);
        bst
    }

    // ── Free-standing SecurityTokenReference ─────────────────────────

    /// Check a `SecurityTokenReference` and remember the element it points
    /// at, for STR-Transforms and signed-element substitution.
    pub(crate) fn process_security_token_reference(
        &mut self,
        str_el: NodeId,
        log_if_nothing_found: bool,
    ) -> Result<()> {
        let (value, vt, encoding, is_reference) =
            if let Some(key_id) = self.wsse_child(str_el, node::KEY_IDENTIFIER) {
                (
                    self.doc.trimmed_text(key_id),
                    self.doc.attribute(key_id, ns::attr::VALUE_TYPE).map(str::to_owned),
                    self.doc
                        .attribute(key_id, ns::attr::ENCODING_TYPE)
                        .map(str::to_owned),
                    false,
                )
            } else if let Some(reference) = self.wsse_child(str_el, node::WSSE_REFERENCE) {
                let uri = self
                    .doc
                    .attribute(reference, ns::attr::URI)
                    .map(|u| u.trim().trim_start_matches('#').to_owned())
                    .filter(|u| !u.is_empty());
                (
                    uri,
                    self.doc
                        .attribute(reference, ns::attr::VALUE_TYPE)
                        .map(str::to_owned),
                    None,
                    true,
                )
            } else {
                if log_if_nothing_found {
                    warn!("SecurityTokenReference has neither KeyIdentifier nor Reference; ignoring");
                }
                return Ok(());
            };

        let value = value.ok_or_else(|| {
            ProcessingError::InvalidDocumentFormat("SecurityTokenReference has no value".into())
        })?;
        let vt = vt.unwrap_or_default();
        let encoding = encoding.filter(|e| !e.is_empty());

        if is_reference && value_type::matches(&vt, value_type::X509V3_SUFFIX) {
            let target = self.str_reference_target(&value)?;
            if !self.is_x509_bst(target) {
                return Err(ProcessingError::InvalidDocumentFormat(format!(
                    "SecurityTokenReference #{value} does not name an X.509 BinarySecurityToken"
                )));
            }
            self.str_to_target.insert(str_el, target);
        } else if value_type::matches(&vt, value_type::SAML_ASSERTION_ID_SUFFIX)
            || value_type::matches(&vt, value_type::SAML_ID_SUFFIX)
        {
            if encoding.is_some() {
                warn!("SAML SecurityTokenReference with an EncodingType; ignoring");
                return Ok(());
            }
            let target = self.str_reference_target(&value)?;
            if !self.is_assertion(target) {
                return Err(ProcessingError::InvalidDocumentFormat(format!(
                    "SecurityTokenReference {value} does not name a SAML assertion"
                )));
            }
            self.str_to_target.insert(str_el, target);
        } else if !is_reference
            && value_type::matches(&vt, value_type::KERBEROS_APREQ_SHA1_SUFFIX)
        {
            self.resolve_kerberos(encoding.as_deref(), &value)?;
        } else if is_reference && vt.is_empty() {
            // No ValueType: accept whatever token element it names.
            match self.lookup_id(&value) {
                Some(target) if self.is_x509_bst(target) || self.is_assertion(target) => {
                    self.str_to_target.insert(str_el, target);
                }
                _ => {
                    if log_if_nothing_found {
                        warn!(uri = %value, "SecurityTokenReference target is not a supported token; ignoring");
                    }
                }
            }
        } else if log_if_nothing_found {
            warn!(value_type = %vt, "unsupported SecurityTokenReference; ignoring");
        }
        Ok(())
    }

    fn str_reference_target(&self, id: &str) -> Result<NodeId> {
        self.lookup_id(id).ok_or_else(|| {
            ProcessingError::InvalidDocumentFormat(format!(
                "SecurityTokenReference target {id} does not resolve to an element"
            ))
        })
    }

    fn is_x509_bst(&self, el: NodeId) -> bool {
        self.doc.local_name(el) == node::BINARY_SECURITY_TOKEN
            && ns::is_security_ns(self.doc.namespace(el))
            && self
                .doc
                .attribute(el, ns::attr::VALUE_TYPE)
                .is_some_and(|vt| value_type::matches(vt, value_type::X509V3_SUFFIX))
    }

    fn is_assertion(&self, el: NodeId) -> bool {
        self.doc.local_name(el) == node::ASSERTION && ns::is_saml_ns(self.doc.namespace(el))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::collaborators::{CertificateResolver, CertificateStore};
    use crate::fixtures;
    use crate::{ProcessorConfig, ProcessorContext};

    /// Counts lookups so cache hits are observable.
    struct CountingResolver {
        inner: CertificateStore,
        calls: AtomicUsize,
    }

    impl CertificateResolver for CountingResolver {
        fn by_thumbprint(&self, thumbprint: &str) -> Option<X509Certificate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.by_thumbprint(thumbprint)
        }

        fn by_ski(&self, ski: &str) -> Option<X509Certificate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.by_ski(ski)
        }

        fn by_issuer_and_serial(
            &self,
            issuer: &DistinguishedName,
            serial: &BigUint,
        ) -> Option<X509Certificate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.by_issuer_and_serial(issuer, serial)
        }
    }

    fn str_elements(pass: &ProcessingPass<'_>) -> Vec<NodeId> {
        let doc = pass.document();
        doc.descendants(doc.root())
            .filter(|&n| doc.local_name(n) == node::SECURITY_TOKEN_REFERENCE)
            .collect()
    }

    fn two_strs(key_identifiers: &str) -> String {
        fixtures::envelope(&format!("{key_identifiers}{key_identifiers}"), "<m:Ping xmlns:m=\"urn:example\"/>")
    }

    #[test]
    fn repeated_thumbprint_reference_hits_the_cache() {
        let signer = fixtures::signer_cert();
        let resolver = Arc::new(CountingResolver {
            inner: CertificateStore::new(vec![signer.clone()]),
            calls: AtomicUsize::new(0),
        });
        let ctx = ProcessorContext::new(ProcessorConfig::default())
            .with_certificate_resolver(resolver.clone());
        let xml = two_strs(&fixtures::str_thumbprint(&signer.thumbprint_base64()));
        let mut pass = ProcessingPass::new(wssec_xml::Document::parse(&xml).unwrap(), &ctx).unwrap();

        let strs = str_elements(&pass);
        let first = pass.resolve_str(strs[0]).unwrap().unwrap();
        let second = pass.resolve_str(strs[1]).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pass.result().tokens().len(), 1);
        let token = pass.result().token(first).unwrap().as_x509().unwrap();
        assert_eq!(token.origin(), X509Origin::Referenced);
        assert_eq!(pass.str_to_target.get(&strs[1]), token.element.as_ref());
    }

    #[test]
    fn same_certificate_by_other_identifier_is_one_token() {
        let signer = fixtures::signer_cert();
        let ctx = ProcessorContext::new(ProcessorConfig::default())
            .with_certificate_resolver(Arc::new(CertificateStore::new(vec![signer.clone()])));
        let xml = fixtures::envelope(
            &format!(
                "{}{}",
                fixtures::str_thumbprint(&signer.thumbprint_base64()),
                fixtures::str_ski(&signer.ski_base64())
            ),
            "",
        );
        let mut pass = ProcessingPass::new(wssec_xml::Document::parse(&xml).unwrap(), &ctx).unwrap();
        let strs = str_elements(&pass);
        let a = pass.resolve_str(strs[0]).unwrap();
        let b = pass.resolve_str(strs[1]).unwrap();
        assert_eq!(a, b);
        assert_eq!(pass.result().tokens().len(), 1);
    }

    #[test]
    fn unknown_thumbprint_resolves_to_nothing() {
        let ctx = ProcessorContext::new(ProcessorConfig::default())
            .with_certificate_resolver(Arc::new(CertificateStore::default()));
        let xml = fixtures::envelope(&fixtures::str_thumbprint("AAAAAAAAAAAAAAAAAAAAAAAAAAA="), "");
        let mut pass = ProcessingPass::new(wssec_xml::Document::parse(&xml).unwrap(), &ctx).unwrap();
        let strs = str_elements(&pass);
        assert_eq!(pass.resolve_str(strs[0]).unwrap(), None);
        assert!(pass.result().tokens().is_empty());
    }

    #[test]
    fn ski_falls_back_to_sender_certificate() {
        let signer = fixtures::signer_cert();
        let ctx = ProcessorContext::default();
        let xml = fixtures::envelope(&fixtures::str_ski(&signer.ski_base64()), "");
        let mut pass = ProcessingPass::new(wssec_xml::Document::parse(&xml).unwrap(), &ctx)
            .unwrap()
            .with_sender_certificate(signer.clone());
        let strs = str_elements(&pass);
        let token = pass.resolve_str(strs[0]).unwrap().unwrap();
        let x509 = pass.result().token(token).unwrap().as_x509().unwrap();
        assert_eq!(x509.origin(), X509Origin::SkiFallback);
        assert_eq!(x509.certificate(), &signer);

        // The synthesized token speaks the STR's namespace.
        let bst = x509.element.unwrap();
        assert_eq!(pass.document().namespace(bst), ns::WSSE);
        assert_eq!(pass.document().local_name(bst), node::BINARY_SECURITY_TOKEN);
        assert!(!pass.document().is_attached(bst));
    }

    #[test]
    fn malformed_issuer_is_ignored_but_missing_serial_is_not() {
        let signer = fixtures::signer_cert();
        let ctx = ProcessorContext::new(ProcessorConfig::default())
            .with_certificate_resolver(Arc::new(CertificateStore::new(vec![signer.clone()])));

        let bad_dn = fixtures::envelope(&fixtures::str_issuer_serial("not a dn", "4660"), "");
        let mut pass = ProcessingPass::new(wssec_xml::Document::parse(&bad_dn).unwrap(), &ctx).unwrap();
        let strs = str_elements(&pass);
        assert_eq!(pass.resolve_str(strs[0]).unwrap(), None);

        let bad_serial = fixtures::envelope(
            &fixtures::str_issuer_serial("CN=Gateway Test Signer, O=Example Corp", "12ab"),
            "",
        );
        let mut pass =
            ProcessingPass::new(wssec_xml::Document::parse(&bad_serial).unwrap(), &ctx).unwrap();
        let strs = str_elements(&pass);
        assert_eq!(pass.resolve_str(strs[0]).unwrap(), None);

        let no_serial = fixtures::envelope(
            &format!(
                "<wsse:SecurityTokenReference><ds:X509Data><ds:X509IssuerSerial>\
                 <ds:X509IssuerName>{}</ds:X509IssuerName>\
                 </ds:X509IssuerSerial></ds:X509Data></wsse:SecurityTokenReference>",
                signer.issuer()
            ),
            "",
        );
        let mut pass =
            ProcessingPass::new(wssec_xml::Document::parse(&no_serial).unwrap(), &ctx).unwrap();
        let strs = str_elements(&pass);
        assert!(matches!(
            pass.resolve_str(strs[0]),
            Err(ProcessingError::InvalidDocumentFormat(_))
        ));
    }

    #[test]
    fn issuer_serial_matches_despite_name_formatting() {
        let signer = fixtures::signer_cert();
        let ctx = ProcessorContext::new(ProcessorConfig::default())
            .with_certificate_resolver(Arc::new(CertificateStore::new(vec![signer.clone()])));
        let xml = fixtures::envelope(
            &fixtures::str_issuer_serial("o=example corp,  CN=Gateway Test Signer", "4660"),
            "",
        );
        let mut pass = ProcessingPass::new(wssec_xml::Document::parse(&xml).unwrap(), &ctx).unwrap();
        let strs = str_elements(&pass);
        let token = pass.resolve_str(strs[0]).unwrap().unwrap();
        assert_eq!(
            pass.result().token(token).unwrap().as_x509().unwrap().origin(),
            X509Origin::IssuerSerial
        );
    }

    #[test]
    fn kerberos_reference_needs_a_context_finder() {
        let xml = fixtures::envelope(
            &format!(
                "<wsse:SecurityTokenReference><wsse:KeyIdentifier ValueType=\"{}\" EncodingType=\"{}\">a2VyYmVyb3M=</wsse:KeyIdentifier></wsse:SecurityTokenReference>",
                value_type::KERBEROS_APREQ_SHA1,
                value_type::BASE64_BINARY
            ),
            "",
        );
        let ctx = ProcessorContext::default();
        let mut pass = ProcessingPass::new(wssec_xml::Document::parse(&xml).unwrap(), &ctx).unwrap();
        let strs = str_elements(&pass);
        assert!(matches!(
            pass.resolve_str(strs[0]),
            Err(ProcessingError::Processor(_))
        ));

        let mut contexts = crate::StaticSecurityContexts::new();
        contexts.insert("a2VyYmVyb3M=", crate::SecretKey::new(vec![3; 16]));
        let ctx = ProcessorContext::default().with_security_contexts(Arc::new(contexts));
        let mut pass = ProcessingPass::new(wssec_xml::Document::parse(&xml).unwrap(), &ctx).unwrap();
        let token = pass.resolve_str(strs[0]).unwrap().unwrap();
        assert_eq!(pass.result().token(token).unwrap().kind(), "SecurityContext");
    }

    #[test]
    fn x509_reference_must_name_a_certificate_token() {
        let xml = fixtures::envelope(
            &format!(
                "<wsse:SecurityTokenReference><wsse:Reference URI=\"#Body\" ValueType=\"{}\"/></wsse:SecurityTokenReference>",
                value_type::X509V3
            ),
            "<m:Ping xmlns:m=\"urn:example\"/>",
        );
        let ctx = ProcessorContext::default();
        let mut pass = ProcessingPass::new(wssec_xml::Document::parse(&xml).unwrap(), &ctx).unwrap();
        let strs = str_elements(&pass);
        assert!(matches!(
            pass.process_security_token_reference(strs[0], true),
            Err(ProcessingError::InvalidDocumentFormat(_))
        ));
    }

    #[test]
    fn str_without_reference_is_ignored() {
        let xml = fixtures::envelope("<wsse:SecurityTokenReference/>", "");
        let ctx = ProcessorContext::default();
        let mut pass = ProcessingPass::new(wssec_xml::Document::parse(&xml).unwrap(), &ctx).unwrap();
        let strs = str_elements(&pass);
        pass.process_security_token_reference(strs[0], true).unwrap();
        assert!(pass.str_to_target.is_empty());
    }
}
