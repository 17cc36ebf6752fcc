//! Full-text acquisition: fetch adapters, the backend registry and the
//! batched fallback scheduler.

pub mod guess;
pub mod scheduler;
pub mod task;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::Serialize;
use tracing::debug;

use crate::dedup::provider_key;
use crate::error::Result;
use crate::identifiers::sanitize_filename;

pub use guess::BackendGuesser;
pub use scheduler::{AcquisitionReport, FailureReason, Resolution, Scheduler, UnresolvedItem};
pub use task::AcquisitionTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Xml,
    Html,
    Pdf,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Html => "html",
            Self::Pdf => "pdf",
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Xml => ".xml",
            Self::Html => ".html",
            Self::Pdf => ".pdf",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a fetch adapter's result stream.
#[derive(Debug)]
pub struct FetchOutcome {
    pub identifier: String,
    pub result: Result<PathBuf>,
}

/// A full-text download backend.
///
/// `fetch_many` must yield exactly one outcome per supplied identifier, in any
/// order. The default implementation runs `fetch` for each identifier with at
/// most `concurrency()` requests in flight.
#[async_trait]
pub trait FetchAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn content_type(&self) -> ContentType;

    fn output_suffix(&self) -> &str {
        self.content_type().suffix()
    }

    fn concurrency(&self) -> usize {
        1
    }

    async fn fetch(&self, identifier: &str, target_dir: &Path) -> Result<PathBuf>;

    fn fetch_many<'a>(
        &'a self,
        identifiers: &'a [String],
        target_dir: &'a Path,
    ) -> BoxStream<'a, FetchOutcome> {
        stream::iter(identifiers)
            .map(move |identifier| async move {
                FetchOutcome {
                    identifier: identifier.clone(),
                    result: self.fetch(identifier, target_dir).await,
                }
            })
            .buffer_unordered(self.concurrency().max(1))
            .boxed()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub content_type: ContentType,
    pub output_suffix: String,
}

/// Fetch adapters keyed by lowercased name.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn FetchAdapter>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: Arc<dyn FetchAdapter>) {
        let key = provider_key(backend.name());
        if self.backends.insert(key.clone(), backend).is_some() {
            debug!(backend = %key, "replaced registered backend");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn FetchAdapter>> {
        self.backends.get(&provider_key(name)).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(&provider_key(name))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn describe(&self) -> Vec<BackendInfo> {
        self.backends
            .iter()
            .map(|(name, backend)| BackendInfo {
                name: name.clone(),
                content_type: backend.content_type(),
                output_suffix: backend.output_suffix().to_string(),
            })
            .collect()
    }

    /// Ordered fallback list: `configured` names that are registered (minus the
    /// last-resort backend and repeats), then every other registered backend in
    /// name order.
    pub fn fallback_order<S: AsRef<str>>(&self, configured: &[S], last_resort: Option<&str>) -> Vec<String> {
        let last_resort = last_resort.map(provider_key);
        let excluded = |name: &str| last_resort.as_deref() == Some(name);

        let mut order: Vec<String> = Vec::new();
        for name in configured {
            let key = provider_key(name.as_ref());
            if self.backends.contains_key(&key) && !excluded(&key) && !order.contains(&key) {
                order.push(key);
            }
        }
        for key in self.backends.keys() {
            if !excluded(key) && !order.contains(key) {
                order.push(key.clone());
            }
        }
        order
    }
}

/// Where a backend stores the artifact for `identifier`.
pub fn artifact_path(target_dir: &Path, identifier: &str, suffix: &str) -> PathBuf {
    target_dir.join(format!("{}{}", sanitize_filename(identifier), suffix))
}

/// Write an artifact under its safe name, creating `target_dir` if needed.
pub async fn write_artifact(
    target_dir: &Path,
    identifier: &str,
    suffix: &str,
    contents: &[u8],
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(target_dir).await?;
    let path = artifact_path(target_dir, identifier, suffix);
    tokio::fs::write(&path, contents).await?;
    Ok(path)
}


#[cfg(test)]
mod tests {
    use super::testing::FakeBackend;
    use super::*;
    use tempfile::TempDir;

    fn registry(names: &[&str]) -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        for name in names {
            registry.register(Arc::new(FakeBackend::new(name)));
        }
        registry
    }

    #[test]
    fn fallback_order_filters_configured_then_appends_sorted_rest() {
        let registry = registry(&["wiley", "acs", "elsevier", "unpaywall", "rsc"]);
        let order = registry.fallback_order(&["Elsevier", "springer", "acs", "elsevier"], Some("unpaywall"));
        assert_eq!(order, vec!["elsevier", "acs", "rsc", "wiley"]);
    }

    #[test]
    fn fallback_order_without_last_resort_keeps_everything() {
        let registry = registry(&["b", "a"]);
        let order = registry.fallback_order::<&str>(&[], None);
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn describe_lists_content_type_and_suffix() {
        let info = registry(&["elsevier"]).describe();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].content_type, ContentType::Xml);
        assert_eq!(info[0].output_suffix, ".xml");
    }

    struct PlainBackend;

    #[async_trait]
    impl FetchAdapter for PlainBackend {
        fn name(&self) -> &str {
            "plain"
        }

        fn content_type(&self) -> ContentType {
            ContentType::Pdf
        }

        fn concurrency(&self) -> usize {
            3
        }

        async fn fetch(&self, identifier: &str, target_dir: &Path) -> Result<PathBuf> {
            if identifier.ends_with('a') {
                Ok(artifact_path(target_dir, identifier, self.output_suffix()))
            } else {
                Err(crate::error::ScienceError::BackendFailure("plain".to_string(), "HTTP 404".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn default_fetch_many_reports_every_identifier_once() {
        let ids: Vec<String> = ["10.1/a", "10.1/b", "10.1/c"].iter().map(|s| s.to_string()).collect();
        let dir = TempDir::new().unwrap();

        let outcomes: Vec<FetchOutcome> = PlainBackend.fetch_many(&ids, dir.path()).collect().await;

        assert_eq!(outcomes.len(), 3);
        let mut seen: Vec<&str> = outcomes.iter().map(|o| o.identifier.as_str()).collect();
        seen.sort();
        assert_eq!(seen, vec!["10.1/a", "10.1/b", "10.1/c"]);
        let ok = outcomes.iter().find(|o| o.identifier == "10.1/a").unwrap();
        assert_eq!(ok.result.as_ref().unwrap(), &dir.path().join("10.1_a.pdf"));
        assert_eq!(outcomes.iter().filter(|o| o.result.is_err()).count(), 2);
    }

    #[tokio::test]
    async fn write_artifact_uses_safe_name() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested");
        let path = write_artifact(&target, "10.1016/j.x(1)", ".xml", b"<a/>").await.unwrap();
        assert_eq!(path, target.join("10.1016_j.x_1.xml"));
        assert_eq!(std::fs::read(&path).unwrap(), b"<a/>");
    }
}
