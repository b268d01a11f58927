//! Text canonicalization for track matching
//!
//! Free-text titles and artists arrive from the external playlist source in
//! wildly inconsistent shapes ("Hey Jude - Remastered 2009", "Beatles, The").
//! Every lookup key and every similarity comparison goes through these
//! functions, and they are applied identically at index-build time and at
//! match time. Divergence between the two sides breaks exact-key lookups, so
//! nothing outside this module normalizes text on its own.

/// Title tokens that carry no identity: edition/mastering noise, featuring
/// markers, and other packaging vocabulary.
const TITLE_NOISE_TOKENS: &[&str] = &[
    "remaster",
    "remastered",
    "remastering",
    "mono",
    "stereo",
    "mix",
    "remix",
    "edit",
    "version",
    "live",
    "demo",
    "bonus",
    "track",
    "radio",
    "single",
    "album",
    "explicit",
    "clean",
    "deluxe",
    "expanded",
    "extended",
    "original",
    "acoustic",
    "instrumental",
    "feat",
    "featuring",
    "ft",
];

/// Base normalization shared by titles and artists: lowercase, strip quote
/// characters, drop `(...)` / `[...]` segments, collapse every run of
/// non-alphanumeric characters to a single space, trim.
pub fn normalize(value: &str) -> String {
    let lowered = value.to_lowercase();
    let unquoted: String = lowered
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '`'))
        .collect();
    let stripped = strip_segments(&strip_segments(&unquoted, '(', ')'), '[', ']');

    let mut collapsed = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        if c.is_ascii_alphanumeric() {
            collapsed.push(c);
        } else {
            collapsed.push(' ');
        }
    }
    collapsed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title normalization: base normalization plus noise-token and year removal.
pub fn normalize_title(value: &str) -> String {
    strip_noise_tokens(&normalize(value))
}

/// Artist normalization: drops a trailing ` (N)` catalog disambiguation
/// suffix (an external-source convention for same-named artists), then base
/// normalization, then stray "the"/"and" tokens.
pub fn normalize_artist(value: &str) -> String {
    let normalized = normalize(strip_catalog_suffix(value));
    normalized
        .split_whitespace()
        .filter(|t| *t != "the" && *t != "and")
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whitespace tokens of the normalized title form.
pub fn tokenize_title(value: &str) -> Vec<String> {
    normalize_title(value)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Whitespace tokens of the normalized artist form.
pub fn tokenize_artist(value: &str) -> Vec<String> {
    normalize_artist(value)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Remove non-nesting `open...close` segments, keeping an unclosed trailing
/// `open` and its remainder intact.
fn strip_segments(value: &str, open: char, close: char) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find(open) {
        out.push_str(&rest[..start]);
        let after_open = start + open.len_utf8();
        match rest[after_open..].find(close) {
            Some(end_rel) => {
                rest = &rest[after_open + end_rel + close.len_utf8()..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Drop noise vocabulary, and standalone year tokens (1900-2099) when the
/// title had more than one token to begin with. A title that IS a year
/// ("1999") keeps it.
fn strip_noise_tokens(value: &str) -> String {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    if tokens.is_empty() {
        return String::new();
    }
    let strip_years = tokens.len() > 1;
    tokens
        .into_iter()
        .filter(|t| !TITLE_NOISE_TOKENS.contains(t))
        .filter(|t| !strip_years || !is_year_token(t))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_year_token(token: &str) -> bool {
    token.len() == 4
        && token
            .parse::<u32>()
            .map(|year| (1900..=2099).contains(&year))
            .unwrap_or(false)
}

fn strip_catalog_suffix(value: &str) -> &str {
    let trimmed = value.trim_end();
    if let Some(open) = trimmed.rfind(" (") {
        if let Some(body) = trimmed[open + 2..].strip_suffix(')') {
            if !body.is_empty() && body.chars().all(|c| c.is_ascii_digit()) {
                return &trimmed[..open];
            }
        }
    }
    value
}
