use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use litfetch_core::{HttpConfig, Record};
use serde_json::Value;
use tracing::debug;

use crate::aggregation::ProviderAdapter;
use crate::error::{Result, ScienceError};
use crate::http::RateLimitedClient;
use crate::sources::{join_nonempty, str_field, strip_tags, with_mailto};

const BASE_URL: &str = "https://api.crossref.org";
const MAX_ROWS: usize = 100;

pub struct CrossRefSource {
    client: RateLimitedClient,
    base_url: String,
    polite_email: Option<String>,
    page_size: usize,
}

impl CrossRefSource {
    pub fn new(http: &HttpConfig, polite_email: Option<String>) -> Result<Self> {
        Self::with_params(BASE_URL, http, Duration::from_millis(200), polite_email)
    }

    pub fn with_params(
        base_url: &str,
        http: &HttpConfig,
        min_interval: Duration,
        polite_email: Option<String>,
    ) -> Result<Self> {
        let user_agent = with_mailto(&http.user_agent, polite_email.as_deref());
        let client = RateLimitedClient::new(
            min_interval,
            http.max_retries,
            &user_agent,
            Duration::from_secs(http.request_timeout_secs),
        )?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            polite_email,
            page_size: MAX_ROWS,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_ROWS);
        self
    }

    fn page_url(&self, query: &str, rows: usize, offset: usize) -> String {
        let mut url = format!(
            "{}/works?query={}&rows={}&offset={}",
            self.base_url,
            urlencoding::encode(query),
            rows,
            offset
        );
        if let Some(email) = &self.polite_email {
            url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
        }
        url
    }
}

#[async_trait]
impl ProviderAdapter for CrossRefSource {
    fn name(&self) -> &str {
        "crossref"
    }

    async fn search(&self, query: &str, cap: usize) -> Result<Vec<Record>> {
        let rows = self.page_size.min(cap).max(1);
        let mut records = Vec::new();
        let mut offset = 0;

        while records.len() < cap {
            let url = self.page_url(query, rows, offset);
            let val: Value = self
                .client
                .get_json(&url)
                .await
                .map_err(|e| ScienceError::ProviderUnavailable("crossref".to_string(), e.to_string()))?;

            let items = val["message"]["items"].as_array().cloned().unwrap_or_default();
            let page_len = items.len();
            records.extend(items.iter().map(work_to_record).take(cap - records.len()));
            debug!(offset, page_len, "crossref page");

            if page_len < rows {
                break;
            }
            offset += rows;
        }

        Ok(records)
    }
}

/// Map one CrossRef `work` object onto a `Record`.
pub fn work_to_record(item: &Value) -> Record {
    let first = |key: &str| {
        item[key]
            .as_array()
            .and_then(|arr| arr.iter().filter_map(Value::as_str).next())
            .unwrap_or_default()
            .trim()
            .to_string()
    };

    Record {
        identifier: str_field(item, "DOI"),
        title: first("title"),
        venue: first("container-title"),
        cover_date: pick_date(item),
        url: str_field(item, "URL"),
        abstract_text: strip_tags(item["abstract"].as_str().unwrap_or_default()),
        authors: join_authors(item),
        source_provider: "crossref".to_string(),
        publisher: str_field(item, "publisher"),
        volume: str_field(item, "volume"),
        issue: str_field(item, "issue"),
        pages: str_field(item, "page"),
        language: str_field(item, "language"),
        keywords: string_list(&item["subject"]),
        issn: string_list(&item["ISSN"]),
    }
}

/// First available of published-print, published-online, created, issued,
/// as `YYYY-MM-DD`, `YYYY-MM` or `YYYY` depending on the parts present.
fn pick_date(item: &Value) -> String {
    ["published-print", "published-online", "created", "issued"]
        .iter()
        .find_map(|key| {
            let parts: Vec<i64> = item[*key]["date-parts"]
                .as_array()?
                .first()?
                .as_array()?
                .iter()
                .filter_map(|p| p.as_i64().or_else(|| p.as_str()?.trim().parse().ok()))
                .collect();
            format_date_parts(&parts)
        })
        .unwrap_or_default()
}

fn format_date_parts(parts: &[i64]) -> Option<String> {
    let year = i32::try_from(*parts.first()?).ok()?;
    let month = parts.get(1).and_then(|m| u32::try_from(*m).ok()).filter(|m| (1..=12).contains(m));
    let day = parts.get(2).and_then(|d| u32::try_from(*d).ok());

    match (month, day) {
        (Some(m), Some(d)) => Some(
            NaiveDate::from_ymd_opt(year, m, d)
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| format!("{year:04}-{m:02}")),
        ),
        (Some(m), None) => Some(format!("{year:04}-{m:02}")),
        (None, _) => Some(format!("{year:04}")),
    }
}

fn join_authors(item: &Value) -> String {
    let names = item["author"]
        .as_array()
        .map(|authors| {
            authors
                .iter()
                .map(|author| {
                    let given = author["given"].as_str().unwrap_or_default().trim();
                    let family = author["family"].as_str().unwrap_or_default().trim();
                    let name = join_nonempty([given, family], " ");
                    if name.is_empty() {
                        author["name"].as_str().unwrap_or_default().trim().to_string()
                    } else {
                        name
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    join_nonempty(names.iter().map(String::as_str), "; ")
}

fn string_list(value: &Value) -> String {
    match value {
        Value::Array(items) => join_nonempty(items.iter().filter_map(Value::as_str), "; "),
        Value::String(s) => s.trim().to_string(),
        _ => String::new(),
    }
}
