pub mod doi;

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

pub use doi::Doi;

static LIST_SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,\s]+").expect("valid regex"));

/// Split a free-form identifier list on commas and whitespace.
pub fn split_identifier_list(input: &str) -> Vec<String> {
    LIST_SEPARATOR_RE
        .split(input.trim())
        .filter(|token| !token.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Trim every entry, drop empties and keep only the first occurrence.
pub fn dedup_identifiers<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter_map(|item| {
            let value = item.as_ref().trim();
            (!value.is_empty() && seen.insert(value.to_string())).then(|| value.to_string())
        })
        .collect()
}

/// Filesystem-safe stem for an identifier: anything outside `[A-Za-z0-9._-]`
/// becomes `_`.
pub fn sanitize_filename(identifier: &str) -> String {
    let safe: String = identifier
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = safe.trim_matches('_');
    if trimmed.is_empty() {
        "article".to_string()
    } else {
        trimmed.to_string()
    }
}
