use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use litfetch_core::{HttpConfig, Record};
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::debug;

use crate::aggregation::ProviderAdapter;
use crate::error::{Result, ScienceError};
use crate::http::RateLimitedClient;
use crate::sources::join_nonempty;

const BASE_URL: &str = "http://export.arxiv.org/api/query";
const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    published: String,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
    #[serde(rename = "arxiv:journal_ref", alias = "journal_ref")]
    journal_ref: Option<String>,
    #[serde(rename = "arxiv:doi", alias = "doi")]
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: Option<String>,
}

pub struct ArxivSource {
    client: RateLimitedClient,
    base_url: String,
    page_size: usize,
}

impl ArxivSource {
    pub fn new(http: &HttpConfig) -> Result<Self> {
        Self::with_params(BASE_URL, http, Duration::from_secs(3))
    }

    pub fn with_params(base_url: &str, http: &HttpConfig, min_interval: Duration) -> Result<Self> {
        Ok(Self {
            client: RateLimitedClient::with_interval(http, min_interval)?,
            base_url: base_url.to_string(),
            page_size: 100,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    fn page_url(&self, query: &str, start: usize) -> String {
        let sep = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}search_query={}&start={}&max_results={}&sortBy=relevance",
            self.base_url,
            sep,
            urlencoding::encode(&search_query(query)),
            start,
            self.page_size
        )
    }
}

/// Plain queries become `all:<query>`; fielded ones (`ti:...`) pass through.
pub fn search_query(query: &str) -> String {
    let query = query.trim();
    let fielded = query.contains("all:")
        || query
            .split_whitespace()
            .next()
            .is_some_and(|first| first.contains(':'));
    if fielded {
        query.to_string()
    } else {
        format!("all:{query}")
    }
}

#[async_trait]
impl ProviderAdapter for ArxivSource {
    fn name(&self) -> &str {
        "arxiv"
    }

    async fn search(&self, query: &str, cap: usize) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut start = 0;

        while records.len() < cap {
            let xml = self
                .client
                .get(&self.page_url(query, start))
                .await
                .map_err(|e| ScienceError::ProviderUnavailable("arxiv".to_string(), e.to_string()))?;
            let page = parse_feed(&xml)?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            records.extend(page.into_iter().take(cap - records.len()));
            debug!(start, page_len, "arxiv page");

            if page_len < self.page_size {
                break;
            }
            start += self.page_size;
        }

        Ok(records)
    }
}

/// Parse an arXiv Atom response into records.
pub fn parse_feed(xml: &str) -> Result<Vec<Record>> {
    let feed: AtomFeed =
        from_str(xml).map_err(|e| ScienceError::Parse(format!("invalid atom xml: {e}")))?;
    Ok(feed.entries.into_iter().map(entry_to_record).collect())
}

fn entry_to_record(entry: AtomEntry) -> Record {
    let id_url = entry.id.trim().to_string();
    let arxiv_id = id_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();

    let identifier = match entry.doi.as_deref().map(str::trim) {
        Some(doi) if !doi.is_empty() => doi.to_string(),
        _ if !arxiv_id.is_empty() => format!("arxiv:{arxiv_id}"),
        _ => String::new(),
    };

    let authors = join_nonempty(entry.authors.iter().map(|a| a.name.as_str()), "; ");
    let keywords = join_nonempty(entry.categories.iter().filter_map(|c| c.term.as_deref()), "; ");
    let published = entry.published.trim();
    let cover_date = DateTime::parse_from_rfc3339(published)
        .map(|ts| ts.date_naive().format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| published.chars().take(10).collect());

    Record {
        identifier,
        title: clean_text(&entry.title),
        venue: entry
            .journal_ref
            .map(|j| clean_text(&j))
            .filter(|j| !j.is_empty())
            .unwrap_or_else(|| "arXiv".to_string()),
        cover_date,
        url: id_url,
        abstract_text: clean_text(&entry.summary),
        authors,
        source_provider: "arxiv".to_string(),
        publisher: "arXiv".to_string(),
        language: "en".to_string(),
        keywords,
        ..Record::default()
    }
}

fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <entry>
    <id>http://arxiv.org/abs/2101.00001v2</id>
    <published>2021-01-01T10:00:00Z</published>
    <title>
      Single-atom   catalysts
    </title>
    <summary>  We study single-atom catalysts.  </summary>
    <author><name>Alice Smith</name></author>
    <author><name>Bob Jones</name></author>
    <category term="cond-mat.mtrl-sci" scheme="http://arxiv.org/schemas/atom"/>
    <category term="physics.chem-ph" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2101.00002v1</id>
    <published>2021-01-02T10:00:00Z</published>
    <title>Published elsewhere</title>
    <summary>Abstract.</summary>
    <author><name>Carol White</name></author>
    <arxiv:doi>10.1021/jacs.1c00001</arxiv:doi>
    <arxiv:journal_ref>J. Am. Chem. Soc. 143 (2021)</arxiv:journal_ref>
  </entry>
</feed>
"#;

    #[test]
    fn parses_entries() {
        let records = parse_feed(FEED).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.identifier, "arxiv:2101.00001v2");
        assert_eq!(first.title, "Single-atom catalysts");
        assert_eq!(first.abstract_text, "We study single-atom catalysts.");
        assert_eq!(first.cover_date, "2021-01-01");
        assert_eq!(first.authors, "Alice Smith; Bob Jones");
        assert_eq!(first.keywords, "cond-mat.mtrl-sci; physics.chem-ph");
        assert_eq!(first.venue, "arXiv");

        let second = &records[1];
        assert_eq!(second.identifier, "10.1021/jacs.1c00001");
        assert_eq!(second.venue, "J. Am. Chem. Soc. 143 (2021)");
    }

    #[test]
    fn query_prefixing() {
        assert_eq!(search_query("graphene oxide"), "all:graphene oxide");
        assert_eq!(search_query("ti:graphene AND au:smith"), "ti:graphene AND au:smith");
        assert_eq!(search_query("all:graphene"), "all:graphene");
    }

    #[test]
    fn malformed_feed_is_parse_error() {
        assert!(matches!(parse_feed("<feed><entry>"), Err(ScienceError::Parse(_))));
    }

    #[tokio::test]
    async fn search_respects_cap() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api/query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("search_query".into(), "all:catalysis".into()),
                Matcher::UrlEncoded("start".into(), "0".into()),
            ]))
            .with_status(200)
            .with_body(FEED)
            .create_async()
            .await;

        let http = HttpConfig {
            max_retries: 0,
            ..HttpConfig::default()
        };
        let source = ArxivSource::with_params(&format!("{}/api/query", server.url()), &http, Duration::ZERO)
            .unwrap()
            .with_page_size(10);
        let records = source.search("catalysis", 1).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_provider, "arxiv");
    }
}
