//! Full-text fetch adapters.

pub mod elsevier;
pub mod landing;
pub mod springer;
pub mod unpaywall;

use std::sync::Arc;

use litfetch_core::{AppConfig, CredentialsConfig};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{info, warn};

use crate::acquisition::BackendRegistry;
use crate::error::{Result, ScienceError};
use crate::http::RateLimitedClient;
use crate::identifiers::Doi;

pub use elsevier::ElsevierFetcher;
pub use landing::DoiLandingFetcher;
pub use springer::SpringerFetcher;
pub use unpaywall::UnpaywallFetcher;

/// Register every fetch backend whose credentials are available.
pub fn build_default_registry(config: &AppConfig) -> Result<BackendRegistry> {
    let http = &config.http;
    let creds = &config.credentials;
    let concurrency = config.fulltext.concurrency.max(1);
    let mut registry = BackendRegistry::new();

    match CredentialsConfig::secret(&creds.elsevier_api_key_env) {
        Some(key) => registry.register(Arc::new(ElsevierFetcher::new(http, key)?.with_concurrency(concurrency))),
        None => warn!(env = %creds.elsevier_api_key_env, "elsevier API key missing, backend disabled"),
    }
    match CredentialsConfig::secret(&creds.springer_api_key_env) {
        Some(key) => registry.register(Arc::new(SpringerFetcher::new(http, key)?.with_concurrency(concurrency))),
        None => warn!(env = %creds.springer_api_key_env, "springer API key missing, backend disabled"),
    }

    registry.register(Arc::new(DoiLandingFetcher::new("acs", http, None)?.with_concurrency(concurrency)));
    registry.register(Arc::new(DoiLandingFetcher::new("rsc", http, None)?.with_concurrency(concurrency)));
    let wiley_token = CredentialsConfig::secret(&creds.wiley_token_env)
        .map(|token| ("wiley-tdm-client-token".to_string(), token));
    registry.register(Arc::new(DoiLandingFetcher::new("wiley", http, wiley_token)?.with_concurrency(concurrency)));

    match creds.polite_email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => registry.register(Arc::new(UnpaywallFetcher::new(http, email)?)),
        None => warn!("credentials.polite_email not set, unpaywall backend disabled"),
    }

    info!(backends = ?registry.names(), "fetch backends registered");
    Ok(registry)
}

/// Client for one publisher, honoring the configured request spacing.
pub(crate) fn publisher_client(config: &litfetch_core::HttpConfig) -> Result<RateLimitedClient> {
    RateLimitedClient::from_config(config)
}

/// Parse `identifier` as a DOI or decline it as unsupported.
pub(crate) fn require_doi(backend: &str, identifier: &str) -> Result<Doi> {
    Doi::parse(identifier)
        .map_err(|_| ScienceError::BackendCapability(backend.to_string(), format!("not a DOI: {identifier}")))
}

/// Wrap transport/API errors as a backend failure, keeping capability and
/// failure errors that are already tagged.
pub(crate) fn backend_error(backend: &str, err: ScienceError) -> ScienceError {
    match err {
        e @ (ScienceError::BackendCapability(..) | ScienceError::BackendFailure(..)) => e,
        other => ScienceError::BackendFailure(backend.to_string(), other.to_string()),
    }
}

pub(crate) fn headers<'a, I>(pairs: I) -> Result<HeaderMap>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ScienceError::Configuration(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ScienceError::Configuration(format!("invalid header value for {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_keeps_tagged_errors() {
        let cap = backend_error("x", ScienceError::BackendCapability("x".into(), "nope".into()));
        assert!(cap.is_capability());

        let wrapped = backend_error("x", ScienceError::ApiError("u".into(), "HTTP 500".into()));
        assert!(matches!(wrapped, ScienceError::BackendFailure(b, msg) if b == "x" && msg.contains("HTTP 500")));
    }

    #[test]
    fn require_doi_declines_non_dois() {
        assert!(require_doi("elsevier", "arxiv:2101.00001").unwrap_err().is_capability());
        assert_eq!(require_doi("elsevier", "10.1016/J.X").unwrap().normalized, "10.1016/j.x");
    }

    #[test]
    fn header_pairs_are_validated() {
        let map = headers([("accept", "application/xml")]).unwrap();
        assert_eq!(map["accept"], "application/xml");
        assert!(headers([("bad header", "x")]).unwrap_err().is_configuration());
    }

    #[test]
    fn landing_backends_are_always_registered() {
        let mut config = AppConfig::default();
        config.credentials.elsevier_api_key_env = "LITFETCH_TEST_UNSET_ELSEVIER".to_string();
        config.credentials.springer_api_key_env = "LITFETCH_TEST_UNSET_SPRINGER".to_string();
        config.credentials.polite_email = None;

        let registry = build_default_registry(&config).unwrap();
        assert_eq!(registry.names(), vec!["acs", "rsc", "wiley"]);

        config.credentials.polite_email = Some("me@example.org".to_string());
        let registry = build_default_registry(&config).unwrap();
        assert!(registry.contains("unpaywall"));
    }
}
