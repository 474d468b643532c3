use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Volatility {
    Stable,
    Volatile,
}

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{3,}").unwrap());
static HEX_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b[0-9a-f]{8,}\b").unwrap());
static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap()
});
static POSITIONAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\d+\]").unwrap());

const CURRENCY: [char; 6] = ['$', '€', '£', '¥', '₹', '₽'];

/// Collapse whitespace and lowercase. `None` for blank input.
pub fn normalize_text(raw: &str) -> Option<String> {
    let normalized = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Values that look generated at runtime: numeric runs, hex or uuid runs,
/// currency amounts.
pub fn looks_dynamic(value: &str) -> bool {
    if UUID.is_match(value) || DIGIT_RUN.is_match(value) || value.contains(CURRENCY) {
        return true;
    }
    // A hex run only counts when it mixes letters and digits; plain words
    // such as "deadbeef" or "accepted" stay stable.
    HEX_RUN.find_iter(value).any(|m| {
        let run = m.as_str();
        run.chars().any(|c| c.is_ascii_digit()) && run.chars().any(|c| c.is_ascii_alphabetic())
    })
}

pub fn classify_volatility(text: &str) -> Volatility {
    let len = text.trim().chars().count();
    if len > 200 || len < 3 || looks_dynamic(text) {
        Volatility::Volatile
    } else {
        Volatility::Stable
    }
}

pub fn has_positional_predicate(path: &str) -> bool {
    POSITIONAL.is_match(path)
}

pub fn path_depth(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

/// Lowercased word tokens of an identifier or label. Splits on camelCase,
/// snake_case, kebab-case, resource-id prefixes (`pkg:id/name`) and
/// whitespace; drops single characters.
pub fn identity_tokens(value: &str) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    let mut current = String::new();
    let mut prev_lower = false;

    let flush = |current: &mut String, tokens: &mut BTreeSet<String>| {
        if current.chars().count() > 1 {
            tokens.insert(current.to_lowercase());
        }
        current.clear();
    };

    for c in value.chars() {
        if !c.is_alphanumeric() {
            flush(&mut current, &mut tokens);
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower {
            flush(&mut current, &mut tokens);
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    flush(&mut current, &mut tokens);
    tokens
}

pub fn text_fingerprint(text: &str) -> String {
    use sha1::{Digest, Sha1};

    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
