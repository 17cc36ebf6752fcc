use std::path::{Path, PathBuf};

use async_trait::async_trait;
use litfetch_core::HttpConfig;

use crate::acquisition::{ContentType, FetchAdapter, write_artifact};
use crate::error::Result;
use crate::fetchers::{backend_error, headers, publisher_client, require_doi};
use crate::http::RateLimitedClient;

const RESOLVER: &str = "https://doi.org";

/// Follows the DOI resolver to the publisher's article page and stores the
/// HTML. Used for publishers without a text-mining API (ACS, RSC, Wiley).
pub struct DoiLandingFetcher {
    name: String,
    client: RateLimitedClient,
    resolver: String,
    auth: Option<(String, String)>,
    concurrency: usize,
}

impl DoiLandingFetcher {
    /// `auth` is an extra `(header, value)` pair sent with every request,
    /// e.g. a Wiley TDM client token.
    pub fn new(name: &str, http: &HttpConfig, auth: Option<(String, String)>) -> Result<Self> {
        Self::with_resolver(name, RESOLVER, http, auth)
    }

    pub fn with_resolver(
        name: &str,
        resolver: &str,
        http: &HttpConfig,
        auth: Option<(String, String)>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            client: publisher_client(http)?,
            resolver: resolver.trim_end_matches('/').to_string(),
            auth,
            concurrency: 1,
        })
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn download(&self, identifier: &str, target_dir: &Path) -> Result<PathBuf> {
        let doi = require_doi(&self.name, identifier)?;
        let url = format!("{}/{}", self.resolver, doi.normalized);

        let mut pairs = vec![("accept", "text/html,application/xhtml+xml")];
        if let Some((header, value)) = &self.auth {
            pairs.push((header.as_str(), value.as_str()));
        }
        let body = self.client.get_bytes(&url, headers(pairs)?).await?;
        write_artifact(target_dir, identifier, self.output_suffix(), &body).await
    }
}

#[async_trait]
impl FetchAdapter for DoiLandingFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn content_type(&self) -> ContentType {
        ContentType::Html
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }

    async fn fetch(&self, identifier: &str, target_dir: &Path) -> Result<PathBuf> {
        self.download(identifier, target_dir)
            .await
            .map_err(|e| backend_error(&self.name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScienceError;
    use mockito::Server;
    use tempfile::TempDir;

    fn http() -> HttpConfig {
        HttpConfig {
            min_interval_ms: 0,
            max_retries: 0,
            ..HttpConfig::default()
        }
    }

    #[tokio::test]
    async fn follows_redirect_and_writes_html() {
        let mut server = Server::new_async().await;
        let landing = format!("{}/doi/full/10.1021/jacs.1", server.url());
        let _resolver = server
            .mock("GET", "/10.1021/jacs.1")
            .with_status(302)
            .with_header("location", &landing)
            .create_async()
            .await;
        let _page = server
            .mock("GET", "/doi/full/10.1021/jacs.1")
            .match_header("accept", "text/html,application/xhtml+xml")
            .with_status(200)
            .with_body("<html>article</html>")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = DoiLandingFetcher::with_resolver("acs", &server.url(), &http(), None).unwrap();
        let path = fetcher.fetch("https://doi.org/10.1021/jacs.1", dir.path()).await.unwrap();

        assert_eq!(fetcher.output_suffix(), ".html");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<html>article</html>");
    }

    #[tokio::test]
    async fn sends_auth_header_when_configured() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/10.1002/anie.1")
            .match_header("wiley-tdm-client-token", "tok")
            .with_status(200)
            .with_body("<html/>")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let auth = Some(("wiley-tdm-client-token".to_string(), "tok".to_string()));
        let fetcher = DoiLandingFetcher::with_resolver("wiley", &server.url(), &http(), auth).unwrap();
        assert!(fetcher.fetch("10.1002/anie.1", dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn not_found_is_backend_failure() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/10.1039/c0xx1")
            .with_status(404)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let fetcher = DoiLandingFetcher::with_resolver("rsc", &server.url(), &http(), None).unwrap();
        let err = fetcher.fetch("10.1039/C0XX1", dir.path()).await.unwrap_err();
        assert!(matches!(err, ScienceError::BackendFailure(b, msg) if b == "rsc" && msg.contains("404")));
    }
}
