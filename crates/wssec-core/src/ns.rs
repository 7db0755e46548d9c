#![forbid(unsafe_code)]

//! Namespace, element, attribute and token-type constants for SOAP
//! message security.

/// XML Digital Signature namespace
pub const DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML Encryption namespace
pub const ENC: &str = "http://www.w3.org/2001/04/xmlenc#";

/// XML Encryption 1.1 namespace
pub const ENC11: &str = "http://www.w3.org/2009/xmlenc11#";

/// Exclusive C14N namespace
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// XML namespace
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS: &str = "http://www.w3.org/2000/xmlns/";

/// SOAP 1.1 envelope namespace
pub const SOAP11_ENV: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// SOAP 1.2 envelope namespace
pub const SOAP12_ENV: &str = "http://www.w3.org/2003/05/soap-envelope";

/// OASIS WS-Security 1.0 extension namespace
pub const WSSE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// OASIS WS-Security 1.1 extension namespace
pub const WSSE11: &str = "http://docs.oasis-open.org/wss/oasis-wss-wssecurity-secext-1.1.xsd";

/// OASIS WS-Security utility namespace
pub const WSU: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

/// Security header namespaces accepted besides [`WSSE`] (pre-OASIS drafts).
pub const WSSE_LEGACY: &[&str] = &[
    "http://schemas.xmlsoap.org/ws/2002/12/secext",
    "http://schemas.xmlsoap.org/ws/2002/07/secext",
    "http://schemas.xmlsoap.org/ws/2002/xx/secext",
    "http://schemas.xmlsoap.org/ws/2003/06/secext",
];

/// Utility namespaces accepted besides [`WSU`].
pub const WSU_LEGACY: &[&str] = &[
    "http://schemas.xmlsoap.org/ws/2002/07/utility",
    "http://schemas.xmlsoap.org/ws/2003/06/utility",
];

/// WS-SecureConversation namespaces.
pub const WSC: &[&str] = &[
    "http://schemas.xmlsoap.org/ws/2004/04/sc",
    "http://schemas.xmlsoap.org/ws/2005/02/sc",
    "http://docs.oasis-open.org/ws-sx/ws-secureconversation/200512",
];

/// SAML 1.x assertion namespace
pub const SAML1: &str = "urn:oasis:names:tc:SAML:1.0:assertion";

/// SAML 2.0 assertion namespace
pub const SAML2: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

pub fn is_security_ns(uri: &str) -> bool {
    uri == WSSE || WSSE_LEGACY.contains(&uri)
}

pub fn is_wsu_ns(uri: &str) -> bool {
    uri == WSU || WSU_LEGACY.contains(&uri)
}

pub fn is_wsc_ns(uri: &str) -> bool {
    WSC.contains(&uri)
}

pub fn is_saml_ns(uri: &str) -> bool {
    uri == SAML1 || uri == SAML2
}

// ── Element names ────────────────────────────────────────────────────

pub mod node {
    // DSig elements
    pub const SIGNATURE: &str = "Signature";
    pub const SIGNED_INFO: &str = "SignedInfo";
    pub const CANONICALIZATION_METHOD: &str = "CanonicalizationMethod";
    pub const SIGNATURE_METHOD: &str = "SignatureMethod";
    pub const SIGNATURE_VALUE: &str = "SignatureValue";
    pub const DIGEST_METHOD: &str = "DigestMethod";
    pub const DIGEST_VALUE: &str = "DigestValue";
    pub const REFERENCE: &str = "Reference";
    pub const TRANSFORMS: &str = "Transforms";
    pub const TRANSFORM: &str = "Transform";
    pub const INCLUSIVE_NAMESPACES: &str = "InclusiveNamespaces";

    // KeyInfo elements
    pub const KEY_INFO: &str = "KeyInfo";
    pub const X509_DATA: &str = "X509Data";
    pub const X509_CERTIFICATE: &str = "X509Certificate";
    pub const X509_ISSUER_SERIAL: &str = "X509IssuerSerial";
    pub const X509_ISSUER_NAME: &str = "X509IssuerName";
    pub const X509_SERIAL_NUMBER: &str = "X509SerialNumber";
    pub const X509_SKI: &str = "X509SKI";

    // Encryption elements
    pub const ENCRYPTED_DATA: &str = "EncryptedData";
    pub const ENCRYPTED_KEY: &str = "EncryptedKey";
    pub const ENCRYPTION_METHOD: &str = "EncryptionMethod";
    pub const CIPHER_DATA: &str = "CipherData";
    pub const CIPHER_VALUE: &str = "CipherValue";
    pub const REFERENCE_LIST: &str = "ReferenceList";
    pub const DATA_REFERENCE: &str = "DataReference";
    pub const RSA_OAEP_PARAMS: &str = "OAEPparams";
    pub const RSA_MGF: &str = "MGF";

    // WS-Security elements
    pub const SECURITY: &str = "Security";
    pub const BINARY_SECURITY_TOKEN: &str = "BinarySecurityToken";
    pub const SECURITY_TOKEN_REFERENCE: &str = "SecurityTokenReference";
    pub const KEY_IDENTIFIER: &str = "KeyIdentifier";
    pub const WSSE_REFERENCE: &str = "Reference";
    pub const TIMESTAMP: &str = "Timestamp";
    pub const CREATED: &str = "Created";
    pub const EXPIRES: &str = "Expires";
    pub const SIGNATURE_CONFIRMATION: &str = "SignatureConfirmation";
    pub const SECURITY_CONTEXT_TOKEN: &str = "SecurityContextToken";
    pub const IDENTIFIER: &str = "Identifier";
    pub const TRANSFORMATION_PARAMETERS: &str = "TransformationParameters";

    // Encryption wrappers promoted on decrypt
    pub const ENCRYPTED_HEADER: &str = "EncryptedHeader";
    pub const ENCRYPTED_ID: &str = "EncryptedID";
    pub const ENCRYPTED_ASSERTION: &str = "EncryptedAssertion";

    // SAML
    pub const ASSERTION: &str = "Assertion";
}

// ── Attribute names ──────────────────────────────────────────────────

pub mod attr {
    pub const ID: &str = "Id";
    pub const URI: &str = "URI";
    pub const TYPE: &str = "Type";
    pub const ALGORITHM: &str = "Algorithm";
    pub const PREFIX_LIST: &str = "PrefixList";
    pub const VALUE_TYPE: &str = "ValueType";
    pub const ENCODING_TYPE: &str = "EncodingType";
    pub const VALUE: &str = "Value";
    pub const ASSERTION_ID: &str = "AssertionID";
}

// ── Token value types ────────────────────────────────────────────────

/// Value types are matched by suffix, since toolkits disagree on the
/// namespace prefix (draft URIs, `wsse:` QName shorthand, 1.0 vs 1.1).
pub mod value_type {
    pub const X509V3_SUFFIX: &str = "X509v3";
    pub const SKI_SUFFIX: &str = "X509SubjectKeyIdentifier";
    pub const THUMBPRINT_SHA1_SUFFIX: &str = "ThumbprintSHA1";
    pub const ENCRYPTED_KEY_SHA1_SUFFIX: &str = "EncryptedKeySHA1";
    pub const SAML_ASSERTION_ID_SUFFIX: &str = "SAMLAssertionID";
    pub const SAML_ID_SUFFIX: &str = "SAMLID";
    pub const KERBEROS_APREQ_SHA1_SUFFIX: &str = "Kerberosv5APREQSHA1";
    pub const GSS_KERBEROS_APREQ_SUFFIX: &str = "GSS_Kerberosv5_AP_REQ";
    pub const BASE64_BINARY_SUFFIX: &str = "Base64Binary";

    pub const X509V3: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";
    pub const SKI: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509SubjectKeyIdentifier";
    pub const THUMBPRINT_SHA1: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-soap-message-security-1.1#ThumbprintSHA1";
    pub const ENCRYPTED_KEY_SHA1: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-soap-message-security-1.1#EncryptedKeySHA1";
    pub const SAML_ASSERTION_ID: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.0#SAMLAssertionID";
    pub const KERBEROS_APREQ_SHA1: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-kerberos-token-profile-1.1#Kerberosv5APREQSHA1";
    pub const BASE64_BINARY: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";

    /// Whether `value` names the token type identified by `suffix`.
    pub fn matches(value: &str, suffix: &str) -> bool {
        value.ends_with(suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_types_match_by_suffix() {
        assert!(value_type::matches(value_type::SKI, value_type::SKI_SUFFIX));
        assert!(value_type::matches("wsse:X509v3", value_type::X509V3_SUFFIX));
        assert!(!value_type::matches(
            value_type::THUMBPRINT_SHA1,
            value_type::ENCRYPTED_KEY_SHA1_SUFFIX
        ));
    }

    #[test]
    fn legacy_security_namespaces() {
        assert!(is_security_ns(WSSE));
        assert!(is_security_ns("http://schemas.xmlsoap.org/ws/2002/12/secext"));
        assert!(!is_security_ns(WSU));
        assert!(is_wsu_ns("http://schemas.xmlsoap.org/ws/2002/07/utility"));
    }
}
