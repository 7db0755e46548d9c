#![forbid(unsafe_code)]

//! Shared error type, algorithm identifiers and WS-Security vocabulary
//! for the wssec crates.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};

/// Decode a base64 text node, tolerating the line breaks and indentation
/// that XML pretty-printers insert into long values.
pub fn decode_base64_text(text: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    let clean: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(clean)?)
}

/// Encode bytes as standard (padded) base64.
pub fn encode_base64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_text_with_line_breaks() {
        let decoded = decode_base64_text("aGVs\n  bG8g\r\n d29y bGQ=").unwrap();
        assert_eq!(decoded, b"hello world");
    }

    #[test]
    fn base64_garbage_is_reported() {
        let err = decode_base64_text("!!not base64!!").unwrap_err();
        assert!(matches!(err, Error::Base64(_)));
    }
}
