use std::collections::BTreeSet;

use crate::locator::locator_model::ElementAttributes;
use crate::locator::normalize::{normalize_text, text_fingerprint};

/// Identity of an element within one screen. Prefers attributes that survive
/// content changes; text is only used when nothing structural is known.
pub fn element_signature(attrs: &ElementAttributes) -> String {
    let class = attrs.class_name.as_deref().unwrap_or("").trim();
    if let Some(id) = non_blank(&attrs.stable_id) {
        return format!("id:{}", id);
    }
    if let Some(a11y) = non_blank(&attrs.accessibility_id) {
        return format!("a11y:{}", a11y);
    }
    if let Some(path) = non_blank(&attrs.path) {
        return format!("path:{}", path);
    }
    let text = attrs
        .text
        .as_deref()
        .and_then(normalize_text)
        .unwrap_or_default();
    format!("class:{}|text:{}", class, text)
}

/// Structural fingerprint of a screen: SHA-1 over its sorted element
/// signatures. A screen with no observed elements falls back to its label.
pub fn screen_fingerprint(signatures: &BTreeSet<String>, label: Option<&str>) -> String {
    if signatures.is_empty() {
        let label = label.and_then(normalize_text).unwrap_or_default();
        return text_fingerprint(&format!("label:{}", label));
    }
    let joined = signatures.iter().cloned().collect::<Vec<_>>().join("\n");
    text_fingerprint(&joined)
}

/// Element ids are scoped to their screen, so identical elements on two
/// screens stay distinct.
pub fn element_id(screen_id: &str, signature: &str) -> String {
    let digest = text_fingerprint(&format!("{}/{}", screen_id, signature));
    digest[..16].to_string()
}

/// `small` is a partial observation of `large`: every element seen in
/// `small` is also in `large`.
pub fn is_partial_view(small: &BTreeSet<String>, large: &BTreeSet<String>) -> bool {
    !small.is_empty() && small.len() < large.len() && small.is_subset(large)
}

pub fn endpoint_key(method: &str, path: &str) -> String {
    format!("{} {}", method.to_uppercase(), path)
}

/// Strip scheme, host, query and fragment; keep a leading slash and drop a
/// trailing one.
pub fn normalize_api_path(url: &str) -> String {
    let without_scheme = match url.find("://") {
        Some(i) => {
            let rest = &url[i + 3..];
            match rest.find('/') {
                Some(j) => &rest[j..],
                None => "/",
            }
        }
        None => url,
    };
    let end = without_scheme
        .find(['?', '#'])
        .unwrap_or(without_scheme.len());
    let path = without_scheme[..end].trim();

    let mut normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Match a declared route template (`/users/{id}/orders`) against an observed
/// concrete path.
pub fn route_matches(template: &str, path: &str) -> bool {
    let template = normalize_api_path(template);
    let t: Vec<&str> = template.split('/').collect();
    let p: Vec<&str> = path.split('/').collect();
    t.len() == p.len()
        && t.iter().zip(&p).all(|(ts, ps)| {
            (ts.starts_with('{') && ts.ends_with('}') && !ps.is_empty()) || ts == ps
        })
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
