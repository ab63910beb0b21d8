// src/normalize/text.rs
use once_cell::sync::OnceCell;
use regex::Regex;

/// Upper bound for any free-text field shown on a card.
const MAX_TEXT_CHARS: usize = 500;

/// Clean upstream free text: decode entities, strip tags, normalize quotes,
/// collapse whitespace, trim, cap length.
pub fn clean_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Option<Regex>> = OnceCell::new();
    if let Some(re_tags) = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").ok()) {
        out = re_tags.replace_all(&out, "").to_string();
    }

    // 3) Curly quotes and guillemets to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (nbsp included)
    static RE_WS: OnceCell<Option<Regex>> = OnceCell::new();
    if let Some(re_ws) = RE_WS.get_or_init(|| Regex::new(r"\s+").ok()) {
        out = re_ws.replace_all(&out, " ").to_string();
    }
    out = out.trim().to_string();

    // 5) Length cap
    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }

    out
}
