#![forbid(unsafe_code)]

//! Character escaping for canonical output, written straight into the
//! output buffer.

#[derive(Clone, Copy, PartialEq, Eq)]
enum Context {
    Text,
    Attribute,
    ProcessingInstruction,
}

fn replacement(ch: char, ctx: Context) -> Option<&'static str> {
    use Context::*;
    match (ch, ctx) {
        ('\r', _) => Some("&#xD;"),
        (_, ProcessingInstruction) => None,
        ('&', _) => Some("&amp;"),
        ('<', _) => Some("&lt;"),
        ('>', Text) => Some("&gt;"),
        ('"', Attribute) => Some("&quot;"),
        ('\t', Attribute) => Some("&#x9;"),
        ('\n', Attribute) => Some("&#xA;"),
        _ => None,
    }
}

fn escape_into(out: &mut Vec<u8>, s: &str, ctx: Context) {
    let mut plain = 0;
    for (i, ch) in s.char_indices() {
        if let Some(rep) = replacement(ch, ctx) {
            out.extend_from_slice(&s.as_bytes()[plain..i]);
            out.extend_from_slice(rep.as_bytes());
            plain = i + ch.len_utf8();
        }
    }
    out.extend_from_slice(&s.as_bytes()[plain..]);
}

/// Text node content.
pub fn text(out: &mut Vec<u8>, s: &str) {
    escape_into(out, s, Context::Text);
}

/// Attribute and namespace declaration values.
pub fn attr(out: &mut Vec<u8>, s: &str) {
    escape_into(out, s, Context::Attribute);
}

/// Processing instruction data.
pub fn pi(out: &mut Vec<u8>, s: &str) {
    escape_into(out, s, Context::ProcessingInstruction);
}
