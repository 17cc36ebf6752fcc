use std::sync::Arc;
use std::time::{Duration, Instant};

use litfetch_core::HttpConfig;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::error::{Result, ScienceError};

// ─── RateLimitedClient ────────────────────────────────────────────────────────

/// Shared HTTP client that spaces requests by `min_interval` and retries
/// transport errors and 429 responses with backoff.
pub struct RateLimitedClient {
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
    max_retries: u32,
}

impl RateLimitedClient {
    pub fn new(
        min_interval: Duration,
        max_retries: u32,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            min_interval,
            last_request: Arc::new(Mutex::new(None)),
            max_retries,
        })
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        Self::new(
            Duration::from_millis(config.min_interval_ms),
            config.max_retries,
            &config.user_agent,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Same settings as `config` but with a provider-specific request spacing.
    pub fn with_interval(config: &HttpConfig, min_interval: Duration) -> Result<Self> {
        Self::new(
            min_interval,
            config.max_retries,
            &config.user_agent,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn send(&self, url: &str, headers: HeaderMap) -> Result<Response> {
        self.send_with(url, || self.client.get(url).headers(headers.clone()))
            .await
    }

    async fn send_with<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            self.wait_for_rate_limit().await;
            match build().send().await {
                Ok(r) if r.status() == 429 => {
                    let wait = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(60);
                    if attempt >= self.max_retries {
                        return Err(ScienceError::RateLimit(host_of(url), wait));
                    }
                    sleep(Duration::from_secs(wait)).await;
                    attempt += 1;
                }
                Ok(r) if !r.status().is_success() => {
                    let status = r.status().as_u16();
                    let body = r.text().await.unwrap_or_default();
                    let snippet: String = body.chars().take(200).collect();
                    return Err(ScienceError::ApiError(
                        url.to_string(),
                        format!("HTTP {status}: {snippet}"),
                    ));
                }
                Ok(r) => return Ok(r),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(ScienceError::Http(e));
                    }
                    let backoff = 2u64.pow(attempt);
                    sleep(Duration::from_secs(backoff)).await;
                    attempt += 1;
                }
            }
        }
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        self.get_with_headers(url, HeaderMap::new()).await
    }

    pub async fn get_with_headers(&self, url: &str, headers: HeaderMap) -> Result<String> {
        let resp = self.send(url, headers).await?;
        resp.text().await.map_err(ScienceError::Http)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let text = self.get(url).await?;
        serde_json::from_str(&text).map_err(|e| ScienceError::Parse(e.to_string()))
    }

    pub async fn get_bytes(&self, url: &str, headers: HeaderMap) -> Result<Vec<u8>> {
        let resp = self.send(url, headers).await?;
        let bytes = resp.bytes().await.map_err(ScienceError::Http)?;
        Ok(bytes.to_vec())
    }
}

fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(ToOwned::to_owned))
        .unwrap_or_else(|| "server".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn client() -> RateLimitedClient {
        RateLimitedClient::new(Duration::ZERO, 0, "litfetch-test", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn get_returns_body_on_success() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/ok")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;

        let body = client().get(&format!("{}/ok", server.url())).await.unwrap();
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn non_success_status_becomes_api_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("not here")
            .create_async()
            .await;

        let err = client()
            .get(&format!("{}/missing", server.url()))
            .await
            .unwrap_err();
        match err {
            ScienceError::ApiError(_, msg) => assert!(msg.contains("HTTP 404")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_without_retries_reports_retry_after() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/busy")
            .with_status(429)
            .with_header("retry-after", "7")
            .create_async()
            .await;

        let err = client()
            .get(&format!("{}/busy", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScienceError::RateLimit(_, 7)));
    }

    #[tokio::test]
    async fn get_bytes_passes_headers() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/file.pdf")
            .match_header("x-api-key", "secret")
            .with_status(200)
            .with_body(b"%PDF-1.7".to_vec())
            .create_async()
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "secret".parse().unwrap());
        let bytes = client()
            .get_bytes(&format!("{}/file.pdf", server.url()), headers)
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.7");
    }
}
