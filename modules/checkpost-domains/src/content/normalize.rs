//! Deterministic text normalization.
//!
//! Semantically identical submissions must hash identically, so every
//! platform adapter and the canonical fetcher run their text through the same
//! function: HTML entity decoding, then collapsing all Unicode whitespace
//! runs to single spaces.

use std::sync::LazyLock;

use regex::Regex;

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid regex")
});

fn decode_entity(body: &str, original: &str) -> String {
    match body {
        "amp" => "&".to_string(),
        "lt" => "<".to_string(),
        "gt" => ">".to_string(),
        "quot" => "\"".to_string(),
        "apos" => "'".to_string(),
        "nbsp" => " ".to_string(),
        _ => {
            let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                // Unknown named entity: leave it verbatim.
                None
            };
            decoded.map(String::from).unwrap_or_else(|| original.to_string())
        }
    }
}

/// Normalize raw submitted or fetched text into its canonical form.
pub fn normalize_text(raw: &str) -> String {
    let decoded = ENTITY_RE.replace_all(raw, |caps: &regex::Captures| {
        decode_entity(&caps[1], &caps[0])
    });
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-separated token count of normalized text.
pub fn word_count(normalized: &str) -> usize {
    normalized.split_whitespace().count()
}
