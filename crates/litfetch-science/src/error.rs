use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScienceError {
    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("rate limit from {0}, retry after {1}s")]
    RateLimit(String, u64),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("provider {0} unavailable: {1}")]
    ProviderUnavailable(String, String),

    #[error("backend {0} does not support this item: {1}")]
    BackendCapability(String, String),

    #[error("backend {0} failed: {1}")]
    BackendFailure(String, String),

    #[error("all backends exhausted for {0}")]
    Exhausted(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("cancelled before completion")]
    Cancelled,
}

impl ScienceError {
    /// A backend declined the item rather than failing to fetch it.
    pub fn is_capability(&self) -> bool {
        matches!(self, Self::BackendCapability(..))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn not_implemented(backend: &str) -> Self {
        Self::BackendCapability(backend.to_string(), "not implemented".to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScienceError>;
