use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::models::Record;

/// Root application configuration, loaded from `~/.config/litfetch/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub metadata: MetadataConfig,
    pub fulltext: FulltextConfig,
    pub http: HttpConfig,
    pub credentials: CredentialsConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub default_query: String,
    pub max_results: usize,
    /// Enabled providers, in invocation order.
    pub providers: Vec<String>,
    /// Provider preference order. Empty means "same as `providers`".
    pub preference: Vec<String>,
    pub provider_max_results: HashMap<String, i64>,
    pub provider_queries: HashMap<String, String>,
    pub provider_delay_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FulltextConfig {
    pub backend_order: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_resort: Option<String>,
    pub default_backend: String,
    pub prefix_backends: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_timeout_secs: Option<u64>,
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub min_interval_ms: u64,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub elsevier_api_key_env: String,
    pub springer_api_key_env: String,
    pub wiley_token_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polite_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_csv: Option<String>,
    pub columns: Vec<String>,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            default_query: "machine learning".to_string(),
            max_results: 200,
            providers: vec![
                "crossref".to_string(),
                "openalex".to_string(),
                "arxiv".to_string(),
            ],
            preference: Vec::new(),
            provider_max_results: HashMap::new(),
            provider_queries: HashMap::new(),
            provider_delay_ms: 0,
            provider_timeout_secs: None,
        }
    }
}

impl Default for FulltextConfig {
    fn default() -> Self {
        let prefix_backends = [
            ("10.1016", "elsevier"),
            ("10.1007", "springer"),
            ("10.1021", "acs"),
            ("10.1039", "rsc"),
            ("10.1002", "wiley"),
        ]
        .into_iter()
        .map(|(prefix, backend)| (prefix.to_string(), backend.to_string()))
        .collect();

        Self {
            backend_order: ["elsevier", "springer", "acs", "wiley", "rsc"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            last_resort: Some("unpaywall".to_string()),
            default_backend: "elsevier".to_string(),
            prefix_backends,
            output_dir: None,
            backend_timeout_secs: None,
            concurrency: 1,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "litfetch/0.1".to_string(),
            min_interval_ms: 2000,
            max_retries: 3,
            request_timeout_secs: 60,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            elsevier_api_key_env: "ELSEVIER_API_KEY".to_string(),
            springer_api_key_env: "SPRINGER_OPEN_ACCESS_KEY".to_string(),
            wiley_token_env: "WILEY_TDM_TOKEN".to_string(),
            polite_email: None,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            metadata_csv: None,
            columns: Record::COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

// ─── Accessors ─────────────────────────────────────────────

impl MetadataConfig {
    /// Preference order, lowercased, falling back to the enabled provider list.
    pub fn preference_order(&self) -> Vec<String> {
        let source = if self.preference.is_empty() {
            &self.providers
        } else {
            &self.preference
        };
        source.iter().map(|p| p.trim().to_lowercase()).collect()
    }

    /// Explicit per-provider caps; non-positive values are ignored.
    pub fn explicit_caps(&self) -> HashMap<String, usize> {
        self.provider_max_results
            .iter()
            .filter(|(_, cap)| **cap > 0)
            .map(|(name, cap)| (name.trim().to_lowercase(), *cap as usize))
            .collect()
    }

    pub fn query_overrides(&self) -> HashMap<String, String> {
        self.provider_queries
            .iter()
            .map(|(name, query)| (name.trim().to_lowercase(), query.clone()))
            .collect()
    }
}

impl CredentialsConfig {
    /// Read a secret from the environment variable named by `env_name`.
    pub fn secret(env_name: &str) -> Option<String> {
        if env_name.trim().is_empty() {
            return None;
        }
        std::env::var(env_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/litfetch/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("LITFETCH_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("litfetch")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.fulltext.concurrency == 0 {
            return Err(CoreError::ConfigError(
                "fulltext.concurrency must be at least 1".to_string(),
            ));
        }
        for column in &self.export.columns {
            if Record::default().get(column).is_none() {
                return Err(CoreError::UnknownColumn(column.clone()));
            }
        }
        Ok(())
    }

    // ─── Derived paths ─────────────────────────────────────

    fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("litfetch")
    }

    /// Where the aggregated metadata CSV is written and read back.
    pub fn metadata_csv_path(&self) -> PathBuf {
        self.export
            .metadata_csv
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::data_dir().join("metadata.csv"))
    }

    /// Directory receiving acquired full-text artifacts.
    pub fn fulltext_dir(&self) -> PathBuf {
        self.fulltext
            .output_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::data_dir().join("fulltext"))
    }
}
