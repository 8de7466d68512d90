//! Alias key normalization and validation
//!
//! Keys are stored lowercased with slashes collapsed and no edge slashes.
//! The allowed character set is `[a-zA-Z0-9_\-/@]`; validation runs on the
//! normalized form without regex.

/// Maximum length of a single alias key.
pub const MAX_KEY_LENGTH: usize = 64;

/// Normalizes a raw key: trims whitespace and edge slashes, collapses `//`
/// runs, lowercases.
pub fn normalize_key(key: &str) -> String {
    let mut key = key.trim().trim_matches('/').to_lowercase();
    while key.contains("//") {
        key = key.replace("//", "/");
    }
    // Collapsing can expose new edge slashes ("//x//" -> "/x/")
    key.trim_matches('/').to_string()
}

/// Checks the normalized key against the allowed character set.
pub fn is_valid_key(key: &str) -> bool {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return false;
    }
    key.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '@'))
}

/// Splits a comma-separated key list, normalizes and validates each entry,
/// and deduplicates while preserving order. Invalid entries are dropped.
pub fn parse_key_list(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut keys = Vec::new();

    for part in raw.split(',') {
        let key = normalize_key(part);
        if is_valid_key(&key) && seen.insert(key.clone()) {
            keys.push(key);
        }
    }

    keys
}
