use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use litfetch_core::HttpConfig;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::debug;

use crate::acquisition::{ContentType, FetchAdapter, write_artifact};
use crate::error::{Result, ScienceError};
use crate::fetchers::{backend_error, require_doi};
use crate::http::RateLimitedClient;

const BASE_URL: &str = "https://api.unpaywall.org/v2";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OaLocation {
    pub url: Option<String>,
    pub url_for_pdf: Option<String>,
    pub host_type: Option<String>,
}

impl OaLocation {
    fn link(&self) -> Option<&str> {
        [self.url_for_pdf.as_deref(), self.url.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OaLookup {
    #[serde(default)]
    pub is_oa: bool,
    pub best_oa_location: Option<OaLocation>,
    #[serde(default)]
    pub oa_locations: Vec<OaLocation>,
}

impl OaLookup {
    /// Best location first, then any other listed location.
    pub fn best_pdf_url(&self) -> Option<&str> {
        self.best_oa_location
            .as_ref()
            .and_then(OaLocation::link)
            .or_else(|| self.oa_locations.iter().find_map(OaLocation::link))
    }
}

/// Open-access copy via Unpaywall. Accepts any DOI; used as the last resort.
pub struct UnpaywallFetcher {
    client: RateLimitedClient,
    base_url: String,
    email: String,
}

impl UnpaywallFetcher {
    pub fn new(http: &HttpConfig, email: &str) -> Result<Self> {
        Self::with_params(BASE_URL, http, Duration::from_millis(200), email)
    }

    pub fn with_params(base_url: &str, http: &HttpConfig, min_interval: Duration, email: &str) -> Result<Self> {
        Ok(Self {
            client: RateLimitedClient::with_interval(http, min_interval)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
        })
    }

    pub async fn lookup(&self, doi: &str) -> Result<OaLookup> {
        let url = format!("{}/{}?email={}", self.base_url, doi, urlencoding::encode(&self.email));
        self.client.get_json(&url).await
    }

    async fn download(&self, identifier: &str, target_dir: &Path) -> Result<PathBuf> {
        let doi = require_doi(self.name(), identifier)?;
        let lookup = self.lookup(&doi.normalized).await?;
        let Some(pdf_url) = lookup.best_pdf_url() else {
            return Err(ScienceError::BackendCapability(
                self.name().to_string(),
                format!("no open-access copy of {}", doi.normalized),
            ));
        };
        debug!(doi = %doi.normalized, url = pdf_url, is_oa = lookup.is_oa, "unpaywall location");

        let body = self.client.get_bytes(pdf_url, HeaderMap::new()).await?;
        write_artifact(target_dir, identifier, self.output_suffix(), &body).await
    }
}

#[async_trait]
impl FetchAdapter for UnpaywallFetcher {
    fn name(&self) -> &str {
        "unpaywall"
    }

    fn content_type(&self) -> ContentType {
        ContentType::Pdf
    }

    async fn fetch(&self, identifier: &str, target_dir: &Path) -> Result<PathBuf> {
        self.download(identifier, target_dir)
            .await
            .map_err(|e| backend_error(self.name(), e))
    }
}
