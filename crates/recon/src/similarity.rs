//! Normalized edit-distance similarity.
//!
//! Inputs are normalized internally (trimmed, whitespace collapsed,
//! lowercased), so callers pass raw text.

/// `1 - levenshtein(a, b) / max(len(a), len(b))`, counted in chars after
/// normalization. Unit costs, no transposition discount.
///
/// Two empty strings are identical: `similarity("", "") == 1.0`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    strsim::normalized_levenshtein(&a, &b).clamp(0.0, 1.0)
}

/// Case-insensitive containment in either direction. Empty input never matches.
pub fn contains_either(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

pub(crate) fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub(crate) fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}
