use std::fmt;

use serde::{Deserialize, Serialize};

/// One bibliographic item as returned by a single provider call.
///
/// Every field is a plain string; an empty string means "absent". Records are
/// treated as immutable once an adapter hands them over: merging always builds
/// a new value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    /// Canonical persistent identifier, usually a DOI.
    pub identifier: String,
    pub title: String,
    pub venue: String,
    pub cover_date: String,
    pub url: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Semicolon-joined display names, order preserved.
    pub authors: String,
    /// Provider that produced (or won) this record.
    pub source_provider: String,
    pub publisher: String,
    pub volume: String,
    pub issue: String,
    pub pages: String,
    pub language: String,
    pub keywords: String,
    pub issn: String,
}

impl Record {
    /// Fixed column order of the tabular export.
    pub const COLUMNS: [&'static str; 15] = [
        "identifier",
        "title",
        "venue",
        "cover_date",
        "url",
        "abstract",
        "authors",
        "source_provider",
        "publisher",
        "volume",
        "issue",
        "pages",
        "language",
        "keywords",
        "issn",
    ];

    pub fn new(identifier: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_source_provider(mut self, provider: impl Into<String>) -> Self {
        self.source_provider = provider.into();
        self
    }

    /// Look up a field by its export column name.
    pub fn get(&self, column: &str) -> Option<&str> {
        let value = match column {
            "identifier" | "doi" => &self.identifier,
            "title" => &self.title,
            "venue" | "publication" => &self.venue,
            "cover_date" => &self.cover_date,
            "url" => &self.url,
            "abstract" => &self.abstract_text,
            "authors" => &self.authors,
            "source_provider" | "source" => &self.source_provider,
            "publisher" => &self.publisher,
            "volume" => &self.volume,
            "issue" => &self.issue,
            "pages" => &self.pages,
            "language" => &self.language,
            "keywords" => &self.keywords,
            "issn" => &self.issn,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Key under which records describing the same work collapse.
    pub fn dedup_key(&self) -> DedupKey {
        let identifier = self.identifier.trim();
        if !identifier.is_empty() {
            return DedupKey(format!("id::{}", identifier.to_lowercase()));
        }
        let title = self.title.trim().to_lowercase();
        let year: String = self.cover_date.trim().chars().take(4).collect();
        DedupKey(format!("title::{title}::year::{year}"))
    }

    /// The export row in [`Record::COLUMNS`] order.
    pub fn to_row(&self) -> Vec<&str> {
        Self::COLUMNS
            .iter()
            .map(|column| self.get(column).unwrap_or_default())
            .collect()
    }
}

/// Derived key identifying "the same work" across providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_prefers_identifier_case_and_space_insensitive() {
        let a = Record::new("  10.1000/ABC ", "One title");
        let b = Record::new("10.1000/abc", "Another title");
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.dedup_key().as_str(), "id::10.1000/abc");
    }

    #[test]
    fn dedup_key_falls_back_to_title_and_year() {
        let mut a = Record::new("", " Deep Learning ");
        a.cover_date = "2015-05-27".to_string();
        let mut b = Record::new("", "deep learning");
        b.cover_date = "2015".to_string();

        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.dedup_key().as_str(), "title::deep learning::year::2015");
    }

    #[test]
    fn dedup_key_distinguishes_years() {
        let mut a = Record::new("", "Deep Learning");
        a.cover_date = "2015".to_string();
        let mut b = Record::new("", "Deep Learning");
        b.cover_date = "2016".to_string();
        assert_ne!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn row_follows_column_order() {
        let mut record = Record::new("10.1/a", "T1").with_source_provider("crossref");
        record.issn = "1234-5678".to_string();

        let row = record.to_row();
        assert_eq!(row.len(), Record::COLUMNS.len());
        assert_eq!(row[0], "10.1/a");
        assert_eq!(row[1], "T1");
        assert_eq!(row[7], "crossref");
        assert_eq!(row[14], "1234-5678");
    }

    #[test]
    fn get_accepts_legacy_column_aliases() {
        let mut record = Record::new("10.1/a", "T1");
        record.venue = "Nature".to_string();
        assert_eq!(record.get("doi"), Some("10.1/a"));
        assert_eq!(record.get("publication"), Some("Nature"));
        assert_eq!(record.get("nonexistent"), None);
    }
}
