use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Build the comparison key shared by registry inserts and resolver lookups.
///
/// Trims, case-folds, strips diacritics (NFKD decomposition with combining
/// marks removed) and collapses internal whitespace runs. Canonical names
/// keep their accents in storage; only this key is accent-free.
pub fn normalize_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    let mut pending_space = false;

    for c in raw.trim().nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !key.is_empty() {
            key.push(' ');
        }
        pending_space = false;
        for lc in c.to_lowercase() {
            key.push(lc);
        }
    }

    key
}
