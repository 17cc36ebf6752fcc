use std::path::{Path, PathBuf};

use async_trait::async_trait;
use litfetch_core::HttpConfig;

use crate::acquisition::{ContentType, FetchAdapter, write_artifact};
use crate::error::Result;
use crate::fetchers::{backend_error, headers, publisher_client, require_doi};
use crate::http::RateLimitedClient;

const BASE_URL: &str = "https://api.elsevier.com";

/// Elsevier Article Retrieval API, full-text XML.
pub struct ElsevierFetcher {
    client: RateLimitedClient,
    base_url: String,
    api_key: String,
    concurrency: usize,
}

impl ElsevierFetcher {
    pub fn new(http: &HttpConfig, api_key: String) -> Result<Self> {
        Self::with_base_url(BASE_URL, http, api_key)
    }

    pub fn with_base_url(base_url: &str, http: &HttpConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: publisher_client(http)?,
            base_url: base_url.trim_end_matches('/').to_string(),
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
        let url = format!(
            "{}/content/article/doi/{}?view=FULL",
            self.base_url,
            urlencoding::encode(&doi.normalized)
        );
        let request_headers = headers([
            ("x-els-apikey", self.api_key.as_str()),
            ("accept", "application/xml"),
        ])?;
        let body = self.client.get_bytes(&url, request_headers).await?;
        write_artifact(target_dir, identifier, self.output_suffix(), &body).await
    }
}

#[async_trait]
impl FetchAdapter for ElsevierFetcher {
    fn name(&self) -> &str {
        "elsevier"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScienceError;
    use mockito::{Matcher, Server};
    use tempfile::TempDir;

    fn http() -> HttpConfig {
        HttpConfig {
            min_interval_ms: 0,
            max_retries: 0,
            ..HttpConfig::default()
        }
    }

    #[tokio::test]
    async fn writes_full_text_xml() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", Matcher::Regex(r"^/content/article/doi/10\.1016.+j\.cell\.1$".to_string()))
            .match_query(Matcher::UrlEncoded("view".into(), "FULL".into()))
            .match_header("x-els-apikey", "key-123")
            .match_header("accept", "application/xml")
            .with_status(200)
            .with_body("<full-text-retrieval-response/>")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = ElsevierFetcher::with_base_url(&server.url(), &http(), "key-123".to_string()).unwrap();
        let path = fetcher.fetch("10.1016/j.cell.1", dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join("10.1016_j.cell.1.xml"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<full-text-retrieval-response/>");
    }

    #[tokio::test]
    async fn http_error_is_backend_failure() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", Matcher::Any)
            .match_query(Matcher::Any)
            .with_status(403)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = ElsevierFetcher::with_base_url(&server.url(), &http(), "bad".to_string()).unwrap();
        let err = fetcher.fetch("10.1016/j.x", dir.path()).await.unwrap_err();
        assert!(matches!(err, ScienceError::BackendFailure(b, _) if b == "elsevier"));
    }

    #[tokio::test]
    async fn non_doi_is_declined() {
        let dir = TempDir::new().unwrap();
        let fetcher = ElsevierFetcher::with_base_url("http://127.0.0.1:9", &http(), "k".to_string()).unwrap();
        let err = fetcher.fetch("arxiv:2101.00001", dir.path()).await.unwrap_err();
        assert!(err.is_capability());
    }
}
