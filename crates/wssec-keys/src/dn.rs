#![forbid(unsafe_code)]

//! Distinguished names in their string form.
//!
//! `X509IssuerName` text is compared against certificate issuers, and the two
//! sides rarely agree on RDN order, attribute-type spelling or letter case.
//! Names are therefore kept as a sorted multiset of normalized
//! `(type, value)` pairs.

use std::fmt;
use wssec_core::Error;

/// A distinguished name, normalized for comparison.
#[derive(Debug, Clone)]
pub struct DistinguishedName {
    display: String,
    components: Vec<(String, String)>,
}

impl DistinguishedName {
    /// Parse an RFC 2253/4514 style name such as `CN=Signer, O=Example`.
    ///
    /// Both `,` and `+` separate components; a component without `=` is
    /// rejected.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut components = Vec::new();
        for raw in split_unescaped(text) {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let (ty, value) = raw
                .split_once('=')
                .ok_or_else(|| Error::Certificate(format!("malformed distinguished name: {text}")))?;
            let ty = normalize_type(ty.trim());
            if ty.is_empty() {
                return Err(Error::Certificate(format!("malformed distinguished name: {text}")));
            }
            components.push((ty, unescape(value.trim()).to_lowercase()));
        }
        if components.is_empty() {
            return Err(Error::Certificate("empty distinguished name".into()));
        }
        components.sort();
        Ok(Self {
            display: text.trim().to_string(),
            components,
        })
    }

    /// Value of the first component of attribute type `ty` (e.g. `cn`), lowercased.
    pub fn component(&self, ty: &str) -> Option<&str> {
        let ty = normalize_type(ty);
        self.components
            .iter()
            .find(|(t, _)| *t == ty)
            .map(|(_, v)| v.as_str())
    }
}

impl PartialEq for DistinguishedName {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for DistinguishedName {}

impl std::hash::Hash for DistinguishedName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl std::str::FromStr for DistinguishedName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_unescaped(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut quoted = false;
    for (i, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => quoted = !quoted,
            ',' | ';' | '+' if !quoted => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn unescape(value: &str) -> String {
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn normalize_type(ty: &str) -> String {
    let lower = ty.to_ascii_lowercase();
    let lower = lower.strip_prefix("oid.").unwrap_or(&lower).to_string();
    match lower.as_str() {
        "2.5.4.3" => "cn".into(),
        "2.5.4.6" => "c".into(),
        "2.5.4.7" => "l".into(),
        "2.5.4.8" | "s" => "st".into(),
        "2.5.4.10" => "o".into(),
        "2.5.4.11" => "ou".into(),
        "2.5.4.9" => "street".into(),
        "0.9.2342.19200300.100.1.25" => "dc".into(),
        "0.9.2342.19200300.100.1.1" | "userid" => "uid".into(),
        "1.2.840.113549.1.9.1" | "e" | "email" => "emailaddress".into(),
        _ => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_case_and_spacing_do_not_matter() {
        let a = DistinguishedName::parse("CN=Gateway Test Signer, O=Example Corp").unwrap();
        let b = DistinguishedName::parse("o=example corp,cn=gateway test signer").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.component("CN"), Some("gateway test signer"));
    }

    #[test]
    fn escaped_separators_stay_in_the_value() {
        let dn = DistinguishedName::parse(r"CN=Smith\, John, O=Example").unwrap();
        assert_eq!(dn.component("cn"), Some("smith, john"));
        let quoted = DistinguishedName::parse(r#"CN="Smith, John", O=Example"#).unwrap();
        assert_eq!(dn, quoted);
    }

    #[test]
    fn oid_aliases() {
        let a = DistinguishedName::parse("2.5.4.3=Signer, E=ops@example.com").unwrap();
        let b = DistinguishedName::parse("CN=Signer, EMAILADDRESS=ops@example.com").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn malformed() {
        assert!(DistinguishedName::parse("not a dn").is_err());
        assert!(DistinguishedName::parse("CN=ok, junk").is_err());
        assert!(DistinguishedName::parse("").is_err());
        assert!(DistinguishedName::parse("=value").is_err());
    }
}
