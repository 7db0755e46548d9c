#![forbid(unsafe_code)]

//! The whole-header pass over `wsse:Security`.
//!
//! Children are handled in document order. Decrypting a child can replace
//! it with new elements; those are visited in turn, since an
//! `EncryptedData` in the header usually hides a token or a signature.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, info, warn};
use wssec_core::ns::{self, node, value_type};
use wssec_keys::X509Certificate;
use wssec_xml::NodeId;

use crate::error::{ProcessingError, Result};
use crate::result::{SignatureConfirmation, Timestamp};
use crate::token::{SecurityContextToken, Token, TokenRef, X509Origin, X509Token};
use crate::ProcessingPass;

impl ProcessingPass<'_> {
    /// Process every child of the `wsse:Security` header.
    pub fn process_security_header(&mut self, header: NodeId) -> Result<()> {
        self.security_header = Some(header);
        self.result.security_ns = Some(self.doc.namespace(header).to_owned());

        let mut visited = HashSet::new();
        loop {
            let next = self
                .doc
                .child_elements(header)
                .find(|c| !visited.contains(c));
            let Some(child) = next else { break };
            visited.insert(child);
            self.process_header_child(header, child)?;
        }

        if self.result.timestamp.is_none() {
            self.timestamp_from_soap_header(header)?;
        }
        Ok(())
    }

    fn process_header_child(&mut self, header: NodeId, child: NodeId) -> Result<()> {
        let namespace = self.doc.namespace(child).to_owned();
        let local = self.doc.local_name(child).to_owned();
        debug!(element = %local, "security header child");

        match local.as_str() {
            node::ENCRYPTED_KEY if namespace == ns::ENC => self.process_header_encrypted_key(child),
            node::ENCRYPTED_DATA if namespace == ns::ENC => self.decrypt(child).map(drop),
            node::REFERENCE_LIST if namespace == ns::ENC => self.decrypt_reference_list(child, None),
            node::TIMESTAMP if ns::is_wsu_ns(&namespace) => self.process_timestamp(child),
            node::BINARY_SECURITY_TOKEN if ns::is_security_ns(&namespace) => {
                self.process_binary_security_token(child).map(drop)
            }
            node::SIGNATURE if namespace == ns::DSIG => {
                self.verify_signature(header, child).map(drop)
            }
            node::SECURITY_CONTEXT_TOKEN if ns::is_wsc_ns(&namespace) => {
                self.process_security_context_token(child).map(drop)
            }
            node::SECURITY_TOKEN_REFERENCE if ns::is_security_ns(&namespace) => {
                self.process_security_token_reference(child, true)
            }
            node::SIGNATURE_CONFIRMATION if namespace == ns::WSSE11 => {
                self.process_signature_confirmation(child);
                Ok(())
            }
            _ => {
                debug!(element = %local, namespace = %namespace, "skipping unrecognised security header element");
                Ok(())
            }
        }
    }

    fn process_header_encrypted_key(&mut self, ek: NodeId) -> Result<()> {
        let Some(token) = self.process_encrypted_key(ek)? else {
            return Ok(());
        };
        if let Some(list) = self.doc.child_element(ek, ns::ENC, node::REFERENCE_LIST) {
            self.decrypt_reference_list(list, Some(token))?;
            self.doc.detach(list);
        }
        Ok(())
    }

    /// Decrypt every `DataReference` of a `ReferenceList`, with `key` or
    /// with whatever key each `EncryptedData` names itself.
    fn decrypt_reference_list(&mut self, list: NodeId, key: Option<TokenRef>) -> Result<()> {
        let uris: Vec<String> = self
            .doc
            .child_elements(list)
            .filter(|&r| self.doc.is_named(r, ns::ENC, node::DATA_REFERENCE))
            .filter_map(|r| self.doc.attribute(r, ns::attr::URI).map(str::to_owned))
            .collect();
        if uris.is_empty() {
            warn!("ReferenceList contains no DataReference");
            return Ok(());
        }
        for uri in uris {
            let target = self.lookup_id(&uri).ok_or_else(|| {
                ProcessingError::Processor(format!("cannot find encrypted element {uri}"))
            })?;
            match key {
                Some(token) => self.decrypt_with_token(target, token)?,
                None => self.decrypt(target)?,
            };
        }
        Ok(())
    }

    /// Register a `BinarySecurityToken`. Kerberos AP-REQ tokens are
    /// recognised but not supported, and yield `None`.
    pub(crate) fn process_binary_security_token(&mut self, bst: NodeId) -> Result<Option<TokenRef>> {
        if let Some(&token) = self.index.by_element.get(&bst) {
            return Ok(Some(token));
        }
        let vt = self.doc.attribute(bst, ns::attr::VALUE_TYPE).unwrap_or("");
        let is_x509 = value_type::matches(vt, value_type::X509V3_SUFFIX);
        let is_kerberos = value_type::matches(vt, value_type::GSS_KERBEROS_APREQ_SUFFIX);
        if !is_x509 && !is_kerberos {
            return Err(ProcessingError::Processor(format!(
                "unsupported BinarySecurityToken ValueType: {vt}"
            )));
        }
        let encoding = self.doc.attribute(bst, ns::attr::ENCODING_TYPE).unwrap_or("");
        if !value_type::matches(encoding, value_type::BASE64_BINARY_SUFFIX) {
            return Err(ProcessingError::Processor(format!(
                "unsupported BinarySecurityToken EncodingType: {encoding}"
            )));
        }
        let value = self
            .doc
            .trimmed_text(bst)
            .ok_or_else(|| ProcessingError::Processor("empty BinarySecurityToken".into()))?;

        let element_id = self.element_id(bst);
        if element_id.is_none() {
            warn!("BinarySecurityToken has no wsu:Id");
        }
        self.note_wsu_ns(bst);

        if is_kerberos {
            info!("Kerberos AP-REQ BinarySecurityToken is not supported; skipping");
            return Ok(None);
        }

        let certificate = X509Certificate::from_base64(&value)?;
        debug!(subject = %certificate.subject(), "X.509 BinarySecurityToken");
        let token = self.register_token(Token::X509(X509Token {
            certificate,
            origin: X509Origin::Embedded,
            element: Some(bst),
            element_id,
        }));
        self.index_certificate(token);
        Ok(Some(token))
    }

    pub(crate) fn process_security_context_token(&mut self, sct: NodeId) -> Result<TokenRef> {
        if let Some(&token) = self.index.by_element.get(&sct) {
            return Ok(token);
        }
        let identifier = self
            .doc
            .child_elements(sct)
            .find(|&c| {
                self.doc.local_name(c) == node::IDENTIFIER && ns::is_wsc_ns(self.doc.namespace(c))
            })
            .and_then(|c| self.doc.trimmed_text(c))
            .ok_or_else(|| {
                ProcessingError::InvalidDocumentFormat(
                    "SecurityContextToken has no Identifier".into(),
                )
            })?;
        let finder = self.ctx.security_contexts.clone().ok_or_else(|| {
            ProcessingError::Processor(
                "SecurityContextToken found but no security context finder is configured".into(),
            )
        })?;
        let context = finder
            .by_identifier(&identifier)
            .ok_or_else(|| ProcessingError::BadSecurityContext(identifier.clone()))?;

        let element_id = self.element_id(sct);
        let token = self.register_token(Token::SecurityContext(SecurityContextToken {
            element: Some(sct),
            element_id,
            context_id: context.identifier,
            secret: context.shared_secret,
        }));
        self.index.by_context_id.insert(identifier, token);
        Ok(token)
    }

    fn process_timestamp(&mut self, ts: NodeId) -> Result<()> {
        if self.result.timestamp.is_some() {
            return Err(ProcessingError::InvalidDocumentFormat(
                "more than one Timestamp in the security header".into(),
            ));
        }
        let wsu = self.doc.namespace(ts).to_owned();
        let created = self.timestamp_child(ts, &wsu, node::CREATED)?;
        let expires = self.timestamp_child(ts, &wsu, node::EXPIRES)?;
        debug!(?created, ?expires, "Timestamp");
        self.result.wsu_ns = Some(wsu);
        self.result.timestamp = Some(Timestamp {
            element: ts,
            created,
            expires,
            signed: false,
        });
        Ok(())
    }

    fn timestamp_child(&self, ts: NodeId, wsu: &str, local: &str) -> Result<Option<DateTime<Utc>>> {
        let Some(el) = self.doc.child_element(ts, wsu, local) else {
            return Ok(None);
        };
        let text = self.doc.trimmed_text(el).unwrap_or_default();
        parse_date_time(&text).map(Some).ok_or_else(|| {
            ProcessingError::InvalidDocumentFormat(format!("unparsable Timestamp {local}: {text}"))
        })
    }

    /// Some toolkits put the Timestamp in the SOAP header instead of the
    /// security header.
    fn timestamp_from_soap_header(&mut self, header: NodeId) -> Result<()> {
        let Some(soap_header) = self.doc.parent_element(header) else {
            return Ok(());
        };
        let ts = self.doc.child_elements(soap_header).find(|&c| {
            self.doc.local_name(c) == node::TIMESTAMP && ns::is_wsu_ns(self.doc.namespace(c))
        });
        match ts {
            Some(ts) => self.process_timestamp(ts),
            None => Ok(()),
        }
    }

    fn process_signature_confirmation(&mut self, sc: NodeId) {
        self.result.wsse11_seen = true;
        match self.doc.attribute(sc, ns::attr::VALUE).map(str::trim) {
            Some(value) if !value.is_empty() => {
                self.result.signature_confirmations.push(SignatureConfirmation {
                    element: sc,
                    value: value.to_owned(),
                });
            }
            _ => debug!("SignatureConfirmation without a Value"),
        }
    }

    fn note_wsu_ns(&mut self, el: NodeId) {
        if self.result.wsu_ns.is_some() {
            return;
        }
        let wsu = self.doc.element(el).and_then(|e| {
            e.attributes
                .iter()
                .find(|a| a.name.local == ns::attr::ID && ns::is_wsu_ns(&a.name.namespace))
                .map(|a| a.name.namespace.clone())
        });
        self.result.wsu_ns = wsu;
    }
}

/// xsd:dateTime, with or without a zone designator (UTC is assumed).
fn parse_date_time(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Datelike;
    use wssec_xml::Document;

    use super::*;
    use crate::fixtures;
    use crate::{ProcessorContext, SecretKey, StaticSecurityContexts};

    fn run(xml: &str, ctx: &ProcessorContext) -> Result<crate::ProcessorResult> {
        let doc = Document::parse(xml).unwrap();
        let header = fixtures::security_header(&doc);
        let mut pass = ProcessingPass::new(doc, ctx)?;
        pass.process_security_header(header)?;
        pass.finish().map(|(_, result)| result)
    }

    #[test]
    fn timestamp_is_parsed() {
        let xml = fixtures::envelope(
            "<wsu:Timestamp wsu:Id=\"TS\"><wsu:Created>2024-03-01T10:00:00Z</wsu:Created>\
             <wsu:Expires>2024-03-01T10:05:00.500</wsu:Expires></wsu:Timestamp>",
            "",
        );
        let result = run(&xml, &ProcessorContext::default()).unwrap();
        let ts = result.timestamp().unwrap();
        assert_eq!(ts.created.unwrap().year(), 2024);
        assert!(ts.expires.unwrap() > ts.created.unwrap());
        assert!(!ts.is_signed());
        assert_eq!(result.wsu_ns(), Some(ns::WSU));
        assert_eq!(result.security_ns(), Some(ns::WSSE));
    }

    #[test]
    fn second_timestamp_is_rejected() {
        let ts = "<wsu:Timestamp><wsu:Created>2024-03-01T10:00:00Z</wsu:Created></wsu:Timestamp>";
        let xml = fixtures::envelope(&format!("{ts}{ts}"), "");
        assert!(matches!(
            run(&xml, &ProcessorContext::default()),
            Err(ProcessingError::InvalidDocumentFormat(_))
        ));
    }

    #[test]
    fn bad_timestamp_date_is_rejected() {
        let xml = fixtures::envelope(
            "<wsu:Timestamp><wsu:Created>yesterday</wsu:Created></wsu:Timestamp>",
            "",
        );
        assert!(matches!(
            run(&xml, &ProcessorContext::default()),
            Err(ProcessingError::InvalidDocumentFormat(_))
        ));
    }

    #[test]
    fn binary_security_token_becomes_a_token() {
        let xml = fixtures::envelope(&fixtures::bst(&fixtures::signer_cert(), "X509-1"), "");
        let result = run(&xml, &ProcessorContext::default()).unwrap();
        assert_eq!(result.tokens().len(), 1);
        let token = result.tokens()[0].as_x509().unwrap();
        assert_eq!(token.origin(), X509Origin::Embedded);
        assert_eq!(result.tokens()[0].element_id(), Some("X509-1"));
    }

    #[test]
    fn unsupported_binary_security_tokens_fail() {
        let wrong_type = fixtures::envelope(
            &format!(
                "<wsse:BinarySecurityToken ValueType=\"urn:example:opaque\" EncodingType=\"{}\">AAAA</wsse:BinarySecurityToken>",
                value_type::BASE64_BINARY
            ),
            "",
        );
        assert!(matches!(
            run(&wrong_type, &ProcessorContext::default()),
            Err(ProcessingError::Processor(_))
        ));

        let empty = fixtures::envelope(
            &format!(
                "<wsse:BinarySecurityToken ValueType=\"{}\" EncodingType=\"{}\"> </wsse:BinarySecurityToken>",
                value_type::X509V3,
                value_type::BASE64_BINARY
            ),
            "",
        );
        assert!(matches!(
            run(&empty, &ProcessorContext::default()),
            Err(ProcessingError::Processor(_))
        ));
    }

    #[test]
    fn kerberos_binary_token_is_skipped() {
        let xml = fixtures::envelope(
            &format!(
                "<wsse:BinarySecurityToken wsu:Id=\"K\" ValueType=\"http://docs.oasis-open.org/wss/oasis-wss-kerberos-token-profile-1.1#GSS_Kerberosv5_AP_REQ\" EncodingType=\"{}\">YXByZXE=</wsse:BinarySecurityToken>",
                value_type::BASE64_BINARY
            ),
            "",
        );
        let result = run(&xml, &ProcessorContext::default()).unwrap();
        assert!(result.tokens().is_empty());
    }

    #[test]
    fn security_context_tokens() {
        let sct = "<wsc:SecurityContextToken xmlns:wsc=\"http://schemas.xmlsoap.org/ws/2005/02/sc\" wsu:Id=\"SCT\">\
                   <wsc:Identifier>urn:uuid:session-1</wsc:Identifier></wsc:SecurityContextToken>";
        let xml = fixtures::envelope(sct, "");

        assert!(matches!(
            run(&xml, &ProcessorContext::default()),
            Err(ProcessingError::Processor(_))
        ));

        let ctx = ProcessorContext::default()
            .with_security_contexts(Arc::new(StaticSecurityContexts::new()));
        assert!(matches!(
            run(&xml, &ctx),
            Err(ProcessingError::BadSecurityContext(id)) if id == "urn:uuid:session-1"
        ));

        let mut contexts = StaticSecurityContexts::new();
        contexts.insert("urn:uuid:session-1", SecretKey::new(vec![5; 32]));
        let ctx = ProcessorContext::default().with_security_contexts(Arc::new(contexts));
        let result = run(&xml, &ctx).unwrap();
        assert_eq!(result.tokens()[0].kind(), "SecurityContext");
    }

    #[test]
    fn signature_confirmations_are_collected() {
        let xml = fixtures::envelope(
            &format!(
                "<wsse11:SignatureConfirmation xmlns:wsse11=\"{}\" Value=\"c2lnMQ==\"/>\
                 <wsse11:SignatureConfirmation xmlns:wsse11=\"{}\"/>",
                ns::WSSE11,
                ns::WSSE11
            ),
            "",
        );
        let result = run(&xml, &ProcessorContext::default()).unwrap();
        assert!(result.wsse11_seen());
        assert_eq!(result.signature_confirmations().len(), 1);
        assert_eq!(result.signature_confirmations()[0].value, "c2lnMQ==");
    }

    #[test]
    fn unknown_children_are_skipped() {
        let xml = fixtures::envelope(
            "<wsse:UsernameToken><wsse:Username>alice</wsse:Username></wsse:UsernameToken>",
            "",
        );
        let result = run(&xml, &ProcessorContext::default()).unwrap();
        assert!(result.tokens().is_empty());
    }

    #[test]
    fn date_time_forms() {
        assert!(parse_date_time("2024-03-01T10:00:00Z").is_some());
        assert!(parse_date_time("2024-03-01T10:00:00+02:00").is_some());
        assert!(parse_date_time("2024-03-01T10:00:00.123").is_some());
        assert!(parse_date_time("2024-03-01").is_none());
    }
}
