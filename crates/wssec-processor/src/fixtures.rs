#![forbid(unsafe_code)]

//! Message builders shared by the unit tests.
//!
//! Messages are built the way a sender would: tokens and references as XML
//! text, digests and signature values computed over the arena document with
//! the same canonicalizer the processor uses.

use wssec_c14n::C14nMode;
use wssec_core::ns::{self, node, value_type};
use wssec_core::{algorithm, encode_base64};
use wssec_crypto::{cipher, digest, keytransport, sign, SigningKey};
use wssec_keys::loader::{load_certificate_pem, load_rsa_private_key_pem};
use wssec_keys::{PrivateKeyEntry, X509Certificate};
use wssec_xml::{Document, NodeId, NodeSet};

const SIGNER_CERT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/signer.crt.pem"));
const SIGNER_KEY: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/signer.key.pem"));
const RECIPIENT_CERT: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/recipient.crt.pem"));
const RECIPIENT_KEY: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/recipient.key.pem"));
// Same key pair as the signer, validity ended in the past.
const EXPIRED_CERT: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../testdata/expired.crt.pem"));

pub const PAYLOAD: &str =
    "<m:Payload xmlns:m=\"urn:example:payload\"><m:Amount>42</m:Amount></m:Payload>";

// ── Keys ─────────────────────────────────────────────────────────────

pub fn signer_cert() -> X509Certificate {
    load_certificate_pem(SIGNER_CERT.as_bytes()).unwrap()
}

pub fn recipient_cert() -> X509Certificate {
    load_certificate_pem(RECIPIENT_CERT.as_bytes()).unwrap()
}

pub fn expired_cert() -> X509Certificate {
    load_certificate_pem(EXPIRED_CERT.as_bytes()).unwrap()
}

pub fn recipient_entry() -> PrivateKeyEntry {
    let key = load_rsa_private_key_pem(RECIPIENT_KEY.as_bytes()).unwrap();
    PrivateKeyEntry::new(key, vec![recipient_cert()])
}

fn signer_key() -> rsa::RsaPrivateKey {
    load_rsa_private_key_pem(SIGNER_KEY.as_bytes()).unwrap()
}

// ── Envelopes ────────────────────────────────────────────────────────

/// SOAP 1.1 envelope with a `wsse:Security` header and a `Body` carrying
/// `wsu:Id="Body"`.
pub fn envelope(security_children: &str, body_children: &str) -> String {
    envelope_with_header("", security_children, body_children)
}

/// Like [`envelope`], with extra SOAP header blocks before the security
/// header.
pub fn envelope_with_header(header_blocks: &str, security_children: &str, body_children: &str) -> String {
    format!(
        "<soap:Envelope xmlns:soap=\"{}\" xmlns:wsse=\"{}\" xmlns:wsu=\"{}\" xmlns:ds=\"{}\" xmlns:xenc=\"{}\">\
         <soap:Header>{header_blocks}<wsse:Security soap:mustUnderstand=\"1\">{security_children}</wsse:Security></soap:Header>\
         <soap:Body wsu:Id=\"Body\">{body_children}</soap:Body></soap:Envelope>",
        ns::SOAP11_ENV,
        ns::WSSE,
        ns::WSU,
        ns::DSIG,
        ns::ENC,
    )
}

/// Envelope with an empty security header and [`PAYLOAD`] in the body.
pub fn signed_body_document() -> Document {
    Document::parse(&envelope("", PAYLOAD)).unwrap()
}

pub fn security_header(doc: &Document) -> NodeId {
    doc.find_descendant(doc.root(), ns::WSSE, node::SECURITY).unwrap()
}

/// Parse `xml` in the namespace context of `context` and return its element.
fn fragment(doc: &mut Document, context: NodeId, xml: &str) -> NodeId {
    let nodes = doc.import_fragment(context, xml).unwrap();
    nodes.into_iter().find(|&n| doc.is_element(n)).unwrap()
}

pub fn add_to_header(doc: &mut Document, xml: &str) -> NodeId {
    let header = security_header(doc);
    let el = fragment(doc, header, xml);
    doc.append_child(header, el);
    el
}

pub fn prepend_to_header(doc: &mut Document, xml: &str) -> NodeId {
    let header = security_header(doc);
    let el = fragment(doc, header, xml);
    let first = doc.first_child(header);
    doc.insert_before(header, el, first);
    el
}

// ── Tokens and references ────────────────────────────────────────────

pub fn bst(cert: &X509Certificate, id: &str) -> String {
    format!(
        "<wsse:BinarySecurityToken wsu:Id=\"{id}\" ValueType=\"{}\" EncodingType=\"{}\">{}</wsse:BinarySecurityToken>",
        value_type::X509V3,
        value_type::BASE64_BINARY,
        encode_base64(cert.der())
    )
}

fn str_key_identifier(value_type: &str, value: &str) -> String {
    format!(
        "<wsse:SecurityTokenReference><wsse:KeyIdentifier ValueType=\"{value_type}\" EncodingType=\"{}\">{value}</wsse:KeyIdentifier></wsse:SecurityTokenReference>",
        value_type::BASE64_BINARY
    )
}

pub fn str_thumbprint(thumbprint: &str) -> String {
    str_key_identifier(value_type::THUMBPRINT_SHA1, thumbprint)
}

pub fn str_ski(ski: &str) -> String {
    str_key_identifier(value_type::SKI, ski)
}

pub fn str_encrypted_key_sha1(sha1: &str) -> String {
    str_key_identifier(value_type::ENCRYPTED_KEY_SHA1, sha1)
}

/// Direct reference to an X.509 `BinarySecurityToken`.
pub fn str_reference(uri: &str) -> String {
    format!(
        "<wsse:SecurityTokenReference><wsse:Reference URI=\"{uri}\" ValueType=\"{}\"/></wsse:SecurityTokenReference>",
        value_type::X509V3
    )
}

pub fn str_issuer_serial(issuer: &str, serial: &str) -> String {
    format!(
        "<wsse:SecurityTokenReference><ds:X509Data><ds:X509IssuerSerial>\
         <ds:X509IssuerName>{issuer}</ds:X509IssuerName>\
         <ds:X509SerialNumber>{serial}</ds:X509SerialNumber>\
         </ds:X509IssuerSerial></ds:X509Data></wsse:SecurityTokenReference>"
    )
}

/// `EncryptedKey` carrying `cek` wrapped (RSA-OAEP) for `cert`, naming the
/// recipient by SKI.
pub fn encrypted_key(cert: &X509Certificate, cek: &[u8], id: &str, data_refs: &[&str]) -> String {
    let transport = keytransport::from_uri(algorithm::RSA_OAEP).unwrap();
    let wrapped = transport
        .encrypt(&cert.rsa_public_key().unwrap(), cek)
        .unwrap();
    let reference_list = if data_refs.is_empty() {
        String::new()
    } else {
        let refs: String = data_refs
            .iter()
            .map(|r| format!("<xenc:DataReference URI=\"{r}\"/>"))
            .collect();
        format!("<xenc:ReferenceList>{refs}</xenc:ReferenceList>")
    };
    format!(
        "<xenc:EncryptedKey Id=\"{id}\"><xenc:EncryptionMethod Algorithm=\"{}\"/>\
         <ds:KeyInfo>{}</ds:KeyInfo>\
         <xenc:CipherData><xenc:CipherValue>{}</xenc:CipherValue></xenc:CipherData>{reference_list}</xenc:EncryptedKey>",
        algorithm::RSA_OAEP,
        str_ski(&cert.ski_base64()),
        encode_base64(&wrapped)
    )
}

/// EncryptedKeySHA1 of the first `EncryptedKey` in `doc`.
pub fn encrypted_key_sha1(doc: &Document) -> String {
    let ek = doc
        .find_descendant(doc.root(), ns::ENC, node::ENCRYPTED_KEY)
        .unwrap();
    let value = doc.find_descendant(ek, ns::ENC, node::CIPHER_VALUE).unwrap();
    let ciphertext = wssec_core::decode_base64_text(&doc.text_content(value)).unwrap();
    encode_base64(&digest::sha1(&ciphertext))
}

fn reference_xml(uri: &str, transforms: &str, data: &[u8]) -> String {
    format!(
        "<ds:Reference URI=\"{uri}\"><ds:Transforms>{transforms}</ds:Transforms>\
         <ds:DigestMethod Algorithm=\"{}\"/><ds:DigestValue>{}</ds:DigestValue></ds:Reference>",
        algorithm::SHA256,
        encode_base64(&digest::digest(algorithm::SHA256, data).unwrap())
    )
}

/// Exclusive-C14N / SHA-256 reference to `""` (with the enveloped
/// transform) or to `#id`.
pub fn reference(doc: &Document, uri: &str) -> String {
    let exc = format!("<ds:Transform Algorithm=\"{}\"/>", algorithm::EXC_C14N);
    if uri.is_empty() {
        let set = NodeSet::all_without_comments(doc);
        let data =
            wssec_c14n::canonicalize(doc, doc.root(), C14nMode::Exclusive, Some(&set), &[]).unwrap();
        let enveloped = format!("<ds:Transform Algorithm=\"{}\"/>", algorithm::ENVELOPED_SIGNATURE);
        return reference_xml(uri, &format!("{enveloped}{exc}"), &data);
    }
    let ids = doc.id_map(&[]).unwrap();
    let el = ids[uri.trim_start_matches('#')];
    let data = wssec_c14n::canonicalize_subtree(doc, el, C14nMode::Exclusive, &[]).unwrap();
    reference_xml(uri, &exc, &data)
}

pub fn attachment_reference(content_id: &str, body: &[u8]) -> String {
    let transform = format!(
        "<ds:Transform Algorithm=\"{}\"/>",
        algorithm::ATTACHMENT_CONTENT_TRANSFORM
    );
    reference_xml(&format!("cid:{content_id}"), &transform, body)
}

/// STR-Transform reference to the STR `str_id`, digesting the token
/// `token_id` it points at.
pub fn str_transform_reference(doc: &Document, str_id: &str, token_id: &str) -> String {
    let ids = doc.id_map(&[]).unwrap();
    let data =
        wssec_c14n::canonicalize_subtree(doc, ids[token_id], C14nMode::Exclusive, &[]).unwrap();
    let transform = format!(
        "<ds:Transform Algorithm=\"{}\"><wsse:TransformationParameters>\
         <ds:CanonicalizationMethod Algorithm=\"{}\"/></wsse:TransformationParameters></ds:Transform>",
        algorithm::STR_TRANSFORM,
        algorithm::EXC_C14N
    );
    reference_xml(&format!("#{str_id}"), &transform, &data)
}

// ── Signing ──────────────────────────────────────────────────────────

pub struct Signer {
    method: &'static str,
    key: SigningKey,
}

impl Signer {
    /// RSA-SHA256 with the signer's private key.
    pub fn rsa() -> Self {
        Self {
            method: algorithm::RSA_SHA256,
            key: SigningKey::Rsa(signer_key()),
        }
    }

    pub fn hmac(secret: &[u8]) -> Self {
        Self {
            method: algorithm::HMAC_SHA256,
            key: SigningKey::Hmac(secret.to_vec()),
        }
    }

    /// Sign `uris` and append the signature to the security header.
    pub fn sign(&self, doc: &mut Document, uris: &[&str], key_info: &str) -> NodeId {
        let references: Vec<String> = uris.iter().map(|u| reference(doc, u)).collect();
        self.sign_references(doc, &references, key_info)
    }

    pub fn sign_references(&self, doc: &mut Document, references: &[String], key_info: &str) -> NodeId {
        let xml = format!(
            "<ds:Signature><ds:SignedInfo>\
             <ds:CanonicalizationMethod Algorithm=\"{}\"/><ds:SignatureMethod Algorithm=\"{}\"/>{}\
             </ds:SignedInfo><ds:SignatureValue></ds:SignatureValue><ds:KeyInfo>{key_info}</ds:KeyInfo></ds:Signature>",
            algorithm::EXC_C14N,
            self.method,
            references.concat()
        );
        let signature = add_to_header(doc, &xml);
        let signed_info = doc
            .child_element(signature, ns::DSIG, node::SIGNED_INFO)
            .unwrap();
        let c14n =
            wssec_c14n::canonicalize_subtree(doc, signed_info, C14nMode::Exclusive, &[]).unwrap();
        let value = sign::from_uri(self.method)
            .unwrap()
            .sign(&self.key, &c14n)
            .unwrap();
        let signature_value = doc
            .child_element(signature, ns::DSIG, node::SIGNATURE_VALUE)
            .unwrap();
        let text = doc.create_text(&encode_base64(&value));
        doc.append_child(signature_value, text);
        signature
    }
}

// ── Encryption ───────────────────────────────────────────────────────

pub struct Encryption {
    cek: Vec<u8>,
    algorithm: &'static str,
    key_info: Option<String>,
}

impl Encryption {
    /// AES-128-CBC with `cek`.
    pub fn new(cek: &[u8]) -> Self {
        Self {
            cek: cek.to_vec(),
            algorithm: algorithm::AES128_CBC,
            key_info: None,
        }
    }

    pub fn aes256(mut self) -> Self {
        self.algorithm = algorithm::AES256_CBC;
        self
    }

    /// Put `key_info` (e.g. an `EncryptedKey`) in the `EncryptedData`.
    pub fn with_key_info(mut self, key_info: &str) -> Self {
        self.key_info = Some(key_info.to_owned());
        self
    }

    /// `EncryptedData` XML for arbitrary `plaintext`.
    pub fn encrypted_data(&self, plaintext: &str, id: &str, type_uri: &str) -> String {
        let ciphertext = cipher::from_uri(self.algorithm)
            .unwrap()
            .encrypt(&self.cek, plaintext.as_bytes())
            .unwrap();
        let key_info = self
            .key_info
            .as_ref()
            .map(|k| format!("<ds:KeyInfo>{k}</ds:KeyInfo>"))
            .unwrap_or_default();
        format!(
            "<xenc:EncryptedData Id=\"{id}\" Type=\"{type_uri}\"><xenc:EncryptionMethod Algorithm=\"{}\"/>{key_info}\
             <xenc:CipherData><xenc:CipherValue>{}</xenc:CipherValue></xenc:CipherData></xenc:EncryptedData>",
            self.algorithm,
            encode_base64(&ciphertext)
        )
    }

    /// Replace the children of `el` with one `EncryptedData`.
    pub fn content(&self, doc: &mut Document, el: NodeId, id: &str) -> NodeId {
        let children: Vec<NodeId> = doc.children(el).collect();
        let plaintext: String = children.iter().map(|&c| doc.to_xml(c)).collect();
        for c in children {
            doc.detach(c);
        }
        let xml = self.encrypted_data(&plaintext, id, "http://www.w3.org/2001/04/xmlenc#Content");
        let enc_data = fragment(doc, el, &xml);
        doc.append_child(el, enc_data);
        enc_data
    }

    /// Replace `el` itself with an `EncryptedData`.
    pub fn element(&self, doc: &mut Document, el: NodeId, id: &str) -> NodeId {
        let plaintext = doc.to_xml(el);
        let parent = doc.parent(el).unwrap();
        let xml = self.encrypted_data(&plaintext, id, "http://www.w3.org/2001/04/xmlenc#Element");
        let enc_data = fragment(doc, parent, &xml);
        doc.replace(el, &[enc_data]).unwrap();
        enc_data
    }

    /// Replace header block `el` with a `wsse11:EncryptedHeader`.
    pub fn encrypted_header(&self, doc: &mut Document, el: NodeId, id: &str) -> NodeId {
        let plaintext = doc.to_xml(el);
        let parent = doc.parent(el).unwrap();
        let xml = format!(
            "<wsse11:EncryptedHeader xmlns:wsse11=\"{}\" wsu:Id=\"EH-{id}\">{}</wsse11:EncryptedHeader>",
            ns::WSSE11,
            self.encrypted_data(&plaintext, id, "http://www.w3.org/2001/04/xmlenc#Element")
        );
        let wrapper = fragment(doc, parent, &xml);
        doc.replace(el, &[wrapper]).unwrap();
        wrapper
    }
}
