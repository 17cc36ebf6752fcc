use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use litfetch_core::{HttpConfig, Record};
use serde_json::Value;
use tracing::debug;

use crate::aggregation::ProviderAdapter;
use crate::error::{Result, ScienceError};
use crate::http::RateLimitedClient;
use crate::sources::{join_nonempty, str_field, with_mailto};

const BASE_URL: &str = "https://api.openalex.org";
const MAX_PER_PAGE: usize = 200;

pub struct OpenAlexSource {
    client: RateLimitedClient,
    base_url: String,
    polite_email: Option<String>,
    per_page: usize,
}

impl OpenAlexSource {
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
            per_page: MAX_PER_PAGE,
        })
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    fn page_url(&self, query: &str, page: usize) -> String {
        let mut url = format!(
            "{}/works?search={}&per_page={}&page={}&filter=is_paratext:false",
            self.base_url,
            urlencoding::encode(query),
            self.per_page,
            page
        );
        if let Some(email) = &self.polite_email {
            url.push_str(&format!("&mailto={}", urlencoding::encode(email)));
        }
        url
    }
}

#[async_trait]
impl ProviderAdapter for OpenAlexSource {
    fn name(&self) -> &str {
        "openalex"
    }

    async fn search(&self, query: &str, cap: usize) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut page = 1;

        while records.len() < cap {
            let val: Value = self
                .client
                .get_json(&self.page_url(query, page))
                .await
                .map_err(|e| ScienceError::ProviderUnavailable("openalex".to_string(), e.to_string()))?;

            let results = val["results"].as_array().cloned().unwrap_or_default();
            if results.is_empty() {
                break;
            }
            let page_len = results.len();
            records.extend(results.iter().map(work_to_record).take(cap - records.len()));
            debug!(page, page_len, "openalex page");

            if page_len < self.per_page {
                break;
            }
            page += 1;
        }

        Ok(records)
    }
}

/// Map one OpenAlex `work` object onto a `Record`.
pub fn work_to_record(item: &Value) -> Record {
    let doi = str_field(item, "doi");
    let identifier = doi
        .strip_prefix("https://doi.org/")
        .unwrap_or(&doi)
        .to_string();

    let cover_date = match str_field(item, "publication_date") {
        date if !date.is_empty() => date,
        _ => str_field(item, "publication_year"),
    };

    // Venue data moved from `host_venue` to `primary_location.source`.
    let location = &item["primary_location"];
    let source = &location["source"];
    let host = &item["host_venue"];
    let venue = first_nonempty([str_field(source, "display_name"), str_field(host, "display_name")]);
    let publisher = first_nonempty([
        str_field(source, "host_organization_name"),
        str_field(host, "publisher"),
    ]);
    let issn = issn_list(&source["issn"]).or_else(|| issn_list(&host["issn"])).unwrap_or_default();
    let url = first_nonempty([
        str_field(location, "landing_page_url"),
        str_field(source, "host_page_url"),
        str_field(item, "id"),
    ]);

    let biblio = &item["biblio"];
    let pages = join_nonempty(
        [str_field(biblio, "first_page").as_str(), str_field(biblio, "last_page").as_str()],
        "-",
    );

    let authors = item["authorships"]
        .as_array()
        .map(|arr| {
            join_nonempty(
                arr.iter().filter_map(|a| a["author"]["display_name"].as_str()),
                "; ",
            )
        })
        .unwrap_or_default();

    let keywords = item["concepts"]
        .as_array()
        .map(|arr| join_nonempty(arr.iter().filter_map(|c| c["display_name"].as_str()), "; "))
        .unwrap_or_default();

    Record {
        identifier,
        title: str_field(item, "title"),
        venue,
        cover_date,
        url,
        abstract_text: reconstruct_abstract(&item["abstract_inverted_index"]).unwrap_or_default(),
        authors,
        source_provider: "openalex".to_string(),
        publisher,
        volume: str_field(biblio, "volume"),
        issue: str_field(biblio, "issue"),
        pages,
        language: str_field(item, "language"),
        keywords,
        issn,
    }
}

/// Rebuild abstract text from OpenAlex's `word -> [positions]` index.
pub fn reconstruct_abstract(index: &Value) -> Option<String> {
    let index = index.as_object()?;
    let mut positions: HashMap<u64, &str> = HashMap::new();
    for (word, slots) in index {
        for pos in slots.as_array()?.iter().filter_map(Value::as_u64) {
            positions.insert(pos, word.as_str());
        }
    }
    let mut ordered: Vec<(u64, &str)> = positions.into_iter().collect();
    ordered.sort_unstable_by_key(|(pos, _)| *pos);

    let text = ordered
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

fn first_nonempty<const N: usize>(candidates: [String; N]) -> String {
    candidates.into_iter().find(|c| !c.is_empty()).unwrap_or_default()
}

fn issn_list(value: &Value) -> Option<String> {
    let joined = match value {
        Value::Array(items) => join_nonempty(items.iter().filter_map(Value::as_str), "; "),
        Value::String(s) => s.trim().to_string(),
        _ => String::new(),
    };
    (!joined.is_empty()).then_some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn work(doi: &str) -> Value {
        json!({
            "id": "https://openalex.org/W1",
            "doi": format!("https://doi.org/{doi}"),
            "title": "Zeolite catalysis",
            "publication_date": "2020-05-01",
            "publication_year": 2020,
            "primary_location": {
                "landing_page_url": "https://example.org/landing",
                "source": {
                    "display_name": "Journal of Catalysis",
                    "host_organization_name": "Elsevier BV",
                    "issn": ["0021-9517"]
                }
            },
            "biblio": {"volume": "381", "issue": null, "first_page": "10", "last_page": "20"},
            "authorships": [
                {"author": {"display_name": "Marie Curie"}},
                {"author": {"display_name": "Pierre Curie"}}
            ],
            "concepts": [{"display_name": "Zeolite"}, {"display_name": "Catalysis"}],
            "language": "en",
            "abstract_inverted_index": {"Zeolites": [0], "are": [1], "porous": [2], "solids": [3]}
        })
    }

    #[test]
    fn maps_work_fields() {
        let record = work_to_record(&work("10.1016/j.jcat.2020.01.001"));
        assert_eq!(record.identifier, "10.1016/j.jcat.2020.01.001");
        assert_eq!(record.venue, "Journal of Catalysis");
        assert_eq!(record.publisher, "Elsevier BV");
        assert_eq!(record.cover_date, "2020-05-01");
        assert_eq!(record.url, "https://example.org/landing");
        assert_eq!(record.pages, "10-20");
        assert_eq!(record.issue, "");
        assert_eq!(record.authors, "Marie Curie; Pierre Curie");
        assert_eq!(record.keywords, "Zeolite; Catalysis");
        assert_eq!(record.issn, "0021-9517");
        assert_eq!(record.abstract_text, "Zeolites are porous solids");
    }

    #[test]
    fn legacy_host_venue_and_year_fallback() {
        let item = json!({
            "id": "https://openalex.org/W2",
            "publication_year": 1999,
            "host_venue": {"display_name": "Old Journal", "publisher": "Old Press", "issn": ["1111-2222"]},
            "biblio": {"first_page": "7"}
        });
        let record = work_to_record(&item);
        assert_eq!(record.identifier, "");
        assert_eq!(record.cover_date, "1999");
        assert_eq!(record.venue, "Old Journal");
        assert_eq!(record.publisher, "Old Press");
        assert_eq!(record.issn, "1111-2222");
        assert_eq!(record.pages, "7");
        assert_eq!(record.url, "https://openalex.org/W2");
    }

    #[test]
    fn abstract_handles_repeated_words() {
        let index = json!({"the": [0, 2], "cat": [1], "mat": [3]});
        assert_eq!(reconstruct_abstract(&index).as_deref(), Some("the cat the mat"));
        assert_eq!(reconstruct_abstract(&Value::Null), None);
    }

    #[tokio::test]
    async fn search_stops_on_short_page() {
        let mut server = Server::new_async().await;
        let body = json!({"results": [work("10.1/a"), work("10.1/b")]}).to_string();
        let _m = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("search".into(), "zeolite".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
                Matcher::UrlEncoded("filter".into(), "is_paratext:false".into()),
            ]))
            .with_status(200)
            .with_body(body)
            .expect(1)
            .create_async()
            .await;

        let http = HttpConfig {
            max_retries: 0,
            ..HttpConfig::default()
        };
        let source = OpenAlexSource::with_params(&server.url(), &http, Duration::ZERO, None)
            .unwrap()
            .with_per_page(5);
        let records = source.search("zeolite", 10).await.unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.source_provider == "openalex"));
        _m.assert_async().await;
    }
}
