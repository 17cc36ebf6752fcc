use std::path::{Path, PathBuf};

use async_trait::async_trait;
use litfetch_core::HttpConfig;
use serde::Deserialize;
use tracing::debug;

use crate::acquisition::{ContentType, FetchAdapter, write_artifact};
use crate::error::{Result, ScienceError};
use crate::fetchers::{backend_error, headers, publisher_client, require_doi};
use crate::http::RateLimitedClient;

const BASE_URL: &str = "https://api.springernature.com/openaccess/jats";

#[derive(Debug, Deserialize)]
struct OpenAccessResponse {
    #[serde(default)]
    records: Vec<OpenAccessRecord>,
}

#[derive(Debug, Deserialize)]
struct OpenAccessRecord {
    #[serde(default)]
    url: Vec<RecordLink>,
}

#[derive(Debug, Deserialize)]
struct RecordLink {
    #[serde(default)]
    format: String,
    #[serde(default)]
    value: String,
}

/// Springer Nature Open Access API: looks the DOI up, then downloads the
/// first JATS/XML rendition it links to.
pub struct SpringerFetcher {
    client: RateLimitedClient,
    base_url: String,
    api_key: String,
    concurrency: usize,
}

impl SpringerFetcher {
    pub fn new(http: &HttpConfig, api_key: String) -> Result<Self> {
        Self::with_base_url(BASE_URL, http, api_key)
    }

    pub fn with_base_url(base_url: &str, http: &HttpConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: publisher_client(http)?,
            base_url: base_url.to_string(),
            api_key,
            concurrency: 1,
        })
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn download(&self, identifier: &str, target_dir: &Path) -> Result<PathBuf> {
        let doi = require_doi(self.name(), identifier)?;
        let lookup = format!(
            "{}?q={}&api_key={}",
            self.base_url,
            urlencoding::encode(&format!("doi:{}", doi.normalized)),
            urlencoding::encode(&self.api_key)
        );
        let text = self
            .client
            .get_with_headers(&lookup, headers([("accept", "application/json")])?)
            .await?;
        let response: OpenAccessResponse =
            serde_json::from_str(&text).map_err(|e| ScienceError::Parse(e.to_string()))?;

        if response.records.is_empty() {
            return Err(ScienceError::BackendCapability(
                self.name().to_string(),
                format!("no open-access record for {}", doi.normalized),
            ));
        }
        let Some(link) = xml_link(&response.records) else {
            return Err(ScienceError::BackendCapability(
                self.name().to_string(),
                format!("no XML rendition for {}", doi.normalized),
            ));
        };
        debug!(doi = %doi.normalized, url = link, "springer xml link");

        let body = self
            .client
            .get_bytes(link, headers([("accept", "application/xml")])?)
            .await?;
        write_artifact(target_dir, identifier, self.output_suffix(), &body).await
    }
}

fn xml_link(records: &[OpenAccessRecord]) -> Option<&str> {
    records
        .iter()
        .flat_map(|r| r.url.iter())
        .find(|link| {
            let format = link.format.to_lowercase();
            (format.contains("xml") || format.contains("jats")) && !link.value.trim().is_empty()
        })
        .map(|link| link.value.trim())
}

#[async_trait]
impl FetchAdapter for SpringerFetcher {
    fn name(&self) -> &str {
        "springer"
    }

    fn content_type(&self) -> ContentType {
        ContentType::Xml
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    async fn fetch(&self, identifier: &str, target_dir: &Path) -> Result<PathBuf> {
        self.download(identifier, target_dir)
            .await
            .map_err(|e| backend_error(self.name(), e))
    }
}
