//! Metadata provider adapters: CrossRef, OpenAlex and arXiv.

pub mod arxiv;
pub mod crossref;
pub mod openalex;

use std::sync::Arc;

use litfetch_core::AppConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::info;

use crate::aggregation::ProviderRegistry;
use crate::error::Result;

pub use arxiv::ArxivSource;
pub use crossref::CrossRefSource;
pub use openalex::OpenAlexSource;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Register every built-in provider adapter.
pub fn build_default_registry(config: &AppConfig) -> Result<ProviderRegistry> {
    let email = config.credentials.polite_email.clone();
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(CrossRefSource::new(&config.http, email.clone())?));
    registry.register(Arc::new(OpenAlexSource::new(&config.http, email)?));
    registry.register(Arc::new(ArxivSource::new(&config.http)?));
    info!(providers = ?registry.names(), "metadata providers registered");
    Ok(registry)
}

/// User agent with a `mailto:` contact appended, for polite-pool access.
pub(crate) fn with_mailto(user_agent: &str, email: Option<&str>) -> String {
    match email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => format!("{user_agent} (mailto:{email})"),
        None => user_agent.to_string(),
    }
}

/// Trimmed string field, empty when missing or not a string.
pub(crate) fn str_field(item: &Value, key: &str) -> String {
    match &item[key] {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn join_nonempty<'a, I>(parts: I, sep: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

/// Drop markup tags (JATS abstracts) and collapse whitespace.
pub(crate) fn strip_tags(input: &str) -> String {
    let text = if input.trim_start().starts_with('<') {
        TAG_RE.replace_all(input, "")
    } else {
        input.into()
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strip_tags_handles_jats_and_plain_text() {
        assert_eq!(strip_tags("<jats:p>Hello <b>world</b></jats:p>"), "Hello world");
        assert_eq!(strip_tags("  plain   text "), "plain text");
        assert_eq!(strip_tags(""), "");
    }

    #[test]
    fn join_skips_blank_parts() {
        assert_eq!(join_nonempty(["a", " ", "b "], "; "), "a; b");
    }

    #[test]
    fn str_field_accepts_numbers() {
        let item = json!({"volume": 12, "issue": " 3 ", "pages": null});
        assert_eq!(str_field(&item, "volume"), "12");
        assert_eq!(str_field(&item, "issue"), "3");
        assert_eq!(str_field(&item, "pages"), "");
    }

    #[test]
    fn mailto_is_appended_only_when_set() {
        assert_eq!(with_mailto("litfetch/0.1", Some("a@b.c")), "litfetch/0.1 (mailto:a@b.c)");
        assert_eq!(with_mailto("litfetch/0.1", Some(" ")), "litfetch/0.1");
        assert_eq!(with_mailto("litfetch/0.1", None), "litfetch/0.1");
    }

    #[test]
    fn default_registry_has_all_providers() {
        let registry = build_default_registry(&AppConfig::default()).unwrap();
        assert_eq!(registry.names(), vec!["arxiv", "crossref", "openalex"]);
    }
}
