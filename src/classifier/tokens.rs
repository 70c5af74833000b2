//! Text extraction from HTML bodies.

use std::borrow::Cow;
use std::sync::OnceLock;

use encoding_rs::Encoding;
use regex::{Captures, Regex};

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"))
}

fn raw_text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</\s*(script|style|noscript)\s*>").expect("valid regex")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"))
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);").expect("valid regex"))
}

fn cyrillic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\p{Cyrillic}&&\p{L}]+").expect("valid regex"))
}

/// Decode `body` using the charset `label`.
///
/// Unknown labels and undecodable input fall back to lossy UTF-8.
pub fn decode_body(body: &[u8], label: &str) -> String {
    match Encoding::for_label(label.trim().as_bytes()) {
        Some(encoding) => {
            let (text, used, had_errors) = encoding.decode(body);
            if had_errors {
                tracing::debug!(encoding = used.name(), "Body does not decode cleanly, using UTF-8");
                String::from_utf8_lossy(body).into_owned()
            } else {
                text.into_owned()
            }
        }
        None => {
            tracing::debug!(label, "Unknown charset label, using UTF-8");
            String::from_utf8_lossy(body).into_owned()
        }
    }
}

/// Reduce an HTML document to its visible text.
pub fn strip_markup(html: &str) -> String {
    let text = comment_re().replace_all(html, " ");
    let text = raw_text_re().replace_all(&text, " ");
    let text = tag_re().replace_all(&text, " ");
    decode_entities(&text).into_owned()
}

/// Every maximal run of Cyrillic letters, in document order.
pub fn cyrillic_words(text: &str) -> Vec<String> {
    cyrillic_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn decode_entities(text: &str) -> Cow<'_, str> {
    entity_re().replace_all(text, |caps: &Captures<'_>| {
        let entity = &caps[1];
        let decoded = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = entity.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            named_entity(entity)
        };
        match decoded {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        }
    })
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "laquo" => '«',
        "raquo" => '»',
        "mdash" => '—',
        "ndash" => '–',
        "hellip" => '…',
        _ => return None,
    })
}
