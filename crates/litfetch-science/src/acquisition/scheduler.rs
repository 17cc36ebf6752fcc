use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use litfetch_core::FulltextConfig;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::task::{AcquisitionTask, Attempt};
use super::{BackendRegistry, FetchAdapter, FetchOutcome};
use crate::dedup::provider_key;
use crate::error::{Result, ScienceError};

/// Number of failed identifiers echoed in the final summary.
const FAILURE_SAMPLE: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub path: PathBuf,
    pub backend: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Every backend, including the last-resort one, failed.
    Exhausted,
    /// The run was cancelled before the task could finish.
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedItem {
    pub identifier: String,
    pub reason: FailureReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Why the task ended unresolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_error: Option<String>,
    pub attempts: Vec<Attempt>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AcquisitionReport {
    pub resolved: BTreeMap<String, Resolution>,
    pub unresolved: Vec<UnresolvedItem>,
    pub cancelled: bool,
}

impl AcquisitionReport {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty() && !self.cancelled
    }

    pub fn total(&self) -> usize {
        self.resolved.len() + self.unresolved.len()
    }
}

/// Batched fallback scheduler for one acquisition run.
///
/// Each backend of the fallback list gets one bulk call with every pending
/// task whose queue head is that backend. Whatever is still unresolved after
/// the single pass goes to the last-resort backend in one final batch.
pub struct Scheduler {
    registry: BackendRegistry,
    fallback: Vec<String>,
    last_resort: Option<String>,
    output_dir: PathBuf,
    batch_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        registry: BackendRegistry,
        fallback: Vec<String>,
        last_resort: Option<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            fallback: fallback.iter().map(|name| provider_key(name)).collect(),
            last_resort: last_resort.as_deref().map(provider_key),
            output_dir: output_dir.into(),
            batch_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Derive the fallback list and last-resort backend from configuration.
    pub fn from_config(registry: BackendRegistry, config: &FulltextConfig, output_dir: impl Into<PathBuf>) -> Self {
        let last_resort = config.last_resort.as_deref().map(provider_key);
        let fallback = registry.fallback_order(&config.backend_order, last_resort.as_deref());
        Self::new(registry, fallback, last_resort, output_dir)
            .with_batch_timeout(config.backend_timeout_secs.map(Duration::from_secs))
    }

    pub fn with_batch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.batch_timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn fallback(&self) -> &[String] {
        &self.fallback
    }

    pub fn last_resort(&self) -> Option<&str> {
        self.last_resort.as_deref()
    }

    /// Fallback backends that are actually registered, in order.
    fn usable_fallback(&self) -> Vec<String> {
        let mut usable = Vec::with_capacity(self.fallback.len());
        for name in &self.fallback {
            if self.last_resort.as_deref() == Some(name.as_str()) || usable.contains(name) {
                continue;
            }
            if self.registry.contains(name) {
                usable.push(name.clone());
            } else {
                warn!(backend = %name, "fallback backend is not registered, skipping");
            }
        }
        usable
    }

    fn usable_last_resort(&self) -> Option<Arc<dyn FetchAdapter>> {
        let name = self.last_resort.as_deref()?;
        let backend = self.registry.get(name);
        if backend.is_none() {
            warn!(backend = %name, "last-resort backend is not registered");
        }
        backend
    }

    /// Acquire every identifier in `items`, each paired with an optional
    /// initial backend guess. Duplicate identifiers collapse onto the first
    /// occurrence.
    pub async fn run(&self, items: Vec<(String, Option<String>)>) -> Result<AcquisitionReport> {
        let fallback = self.usable_fallback();
        let last_resort = self.usable_last_resort();
        if fallback.is_empty() && last_resort.is_none() {
            return Err(ScienceError::Configuration(
                "no fetch backend is registered".to_string(),
            ));
        }
        info!(
            order = %fallback.join(" -> "),
            last_resort = self.last_resort.as_deref().unwrap_or("none"),
            "fulltext backend order"
        );

        let mut tasks = self.build_tasks(items, &fallback);
        let total = tasks.len();
        if total == 0 {
            info!("no identifiers to acquire");
            return Ok(AcquisitionReport::default());
        }
        info!(total, "starting fulltext acquisition");

        let mut cancelled = false;
        for backend_name in &fallback {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let batch: Vec<usize> = tasks
                .iter()
                .enumerate()
                .filter(|(_, task)| !task.is_resolved() && task.head() == Some(backend_name.as_str()))
                .map(|(idx, _)| idx)
                .collect();
            if batch.is_empty() {
                continue;
            }

            let Some(backend) = self.registry.get(backend_name) else {
                continue;
            };
            let resolved = tasks.iter().filter(|t| t.is_resolved()).count();
            info!(
                backend = %backend_name,
                batch = batch.len(),
                pending = total - resolved,
                "dispatching batch"
            );
            self.dispatch(backend.as_ref(), &mut tasks, &batch).await;
        }

        let pending: Vec<usize> = tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| !task.is_resolved())
            .map(|(idx, _)| idx)
            .collect();

        // A cancel that lands after the last task resolved leaves nothing to skip.
        let cancelled = !pending.is_empty() && (cancelled || self.cancel.is_cancelled());

        if !cancelled && !pending.is_empty() {
            match &last_resort {
                Some(backend) => {
                    info!(
                        backend = %backend.name(),
                        pending = pending.len(),
                        "ordered backends exhausted, trying last resort"
                    );
                    self.dispatch(backend.as_ref(), &mut tasks, &pending).await;
                }
                None => warn!(
                    pending = pending.len(),
                    "identifiers failed on every ordered backend and no last-resort backend is available"
                ),
            }
        }

        if cancelled {
            info!("acquisition cancelled, remaining identifiers left unresolved");
        }

        Ok(self.finish(tasks, cancelled))
    }

    fn build_tasks(&self, items: Vec<(String, Option<String>)>, fallback: &[String]) -> Vec<AcquisitionTask> {
        let mut seen = HashSet::new();
        let mut tasks = Vec::new();
        for (identifier, guess) in items {
            let identifier = identifier.trim().to_string();
            if identifier.is_empty() || !seen.insert(identifier.clone()) {
                continue;
            }

            let guess = guess
                .as_deref()
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(provider_key);
            if let Some(name) = guess.as_deref()
                && !fallback.iter().any(|f| f == name)
            {
                if self.registry.contains(name) {
                    debug!(identifier = %identifier, backend = %name, "initial guess is not an ordered backend, using default order");
                } else {
                    warn!(identifier = %identifier, backend = %name, "initial guess is not a registered backend, using default order");
                }
            }

            let task = AcquisitionTask::new(identifier, guess.as_deref(), fallback);
            if task.head().is_none() {
                debug!(identifier = %task.identifier(), "no ordered backend, routing straight to last resort");
            }
            tasks.push(task);
        }
        tasks
    }

    /// Send one batch to `backend` and apply each reported outcome at most
    /// once. Batch members with no outcome (timeout, short stream) fail.
    async fn dispatch(
        &self,
        backend: &dyn FetchAdapter,
        tasks: &mut [AcquisitionTask],
        batch: &[usize],
    ) {
        let name = provider_key(backend.name());
        let ids: Vec<String> = batch.iter().map(|&idx| tasks[idx].identifier().to_string()).collect();
        let members: HashMap<&str, usize> = ids
            .iter()
            .zip(batch.iter().copied())
            .map(|(id, idx)| (id.as_str(), idx))
            .collect();

        let mut received: Vec<FetchOutcome> = Vec::with_capacity(ids.len());
        let mut stream = backend.fetch_many(&ids, &self.output_dir);
        let drain = async {
            while let Some(outcome) = stream.next().await {
                received.push(outcome);
            }
        };
        let batch_error = match self.batch_timeout {
            Some(limit) => tokio::time::timeout(limit, drain)
                .await
                .err()
                .map(|_| format!("batch timed out after {}s", limit.as_secs())),
            None => {
                drain.await;
                None
            }
        };
        drop(stream);

        let mut applied: HashSet<usize> = HashSet::with_capacity(batch.len());
        for outcome in received {
            let Some(&idx) = members.get(outcome.identifier.as_str()) else {
                warn!(backend = %name, identifier = %outcome.identifier, "ignoring result for identifier outside the batch");
                continue;
            };
            if !applied.insert(idx) {
                warn!(backend = %name, identifier = %outcome.identifier, "ignoring duplicate result");
                continue;
            }
            apply(&mut tasks[idx], &name, backend, outcome.result);
        }

        let missing = batch.iter().copied().filter(|idx| !applied.contains(idx));
        let reason = batch_error.unwrap_or_else(|| "backend reported no result".to_string());
        for idx in missing {
            let err = ScienceError::BackendFailure(name.clone(), reason.clone());
            apply(&mut tasks[idx], &name, backend, Err(err));
        }
    }

    fn finish(&self, tasks: Vec<AcquisitionTask>, cancelled: bool) -> AcquisitionReport {
        let mut report = AcquisitionReport {
            cancelled,
            ..AcquisitionReport::default()
        };

        for mut task in tasks {
            if let Some((path, backend)) = task.resolution() {
                report.resolved.insert(
                    task.identifier().to_string(),
                    Resolution {
                        path: path.clone(),
                        backend: backend.to_string(),
                    },
                );
                continue;
            }

            let reason = if cancelled {
                task.mark_terminal(ScienceError::Cancelled.to_string());
                FailureReason::Cancelled
            } else {
                task.mark_terminal(ScienceError::Exhausted(task.identifier().to_string()).to_string());
                FailureReason::Exhausted
            };
            report.unresolved.push(UnresolvedItem {
                identifier: task.identifier().to_string(),
                reason,
                last_error: task.last_error().map(ToOwned::to_owned),
                terminal_error: task.terminal_error().map(ToOwned::to_owned),
                attempts: task.attempts().to_vec(),
            });
        }

        info!(
            resolved = report.resolved.len(),
            unresolved = report.unresolved.len(),
            "fulltext acquisition finished"
        );
        if !report.unresolved.is_empty() {
            let sample: Vec<&str> = report
                .unresolved
                .iter()
                .take(FAILURE_SAMPLE)
                .map(|item| item.identifier.as_str())
                .collect();
            let suffix = if report.unresolved.len() > FAILURE_SAMPLE { ", ..." } else { "" };
            error!("still unresolved: {}{}", sample.join(", "), suffix);
        }
        report
    }
}

fn apply(
    task: &mut AcquisitionTask,
    backend_name: &str,
    backend: &dyn FetchAdapter,
    result: Result<PathBuf>,
) {
    match result {
        Ok(path) => {
            info!(
                identifier = %task.identifier(),
                backend = %backend_name,
                content = %backend.content_type(),
                path = %path.display(),
                "fulltext acquired"
            );
            task.record_success(backend_name, path);
        }
        Err(e) => {
            if e.is_capability() {
                warn!(identifier = %task.identifier(), backend = %backend_name, reason = %e, "backend cannot serve identifier");
            } else {
                error!(identifier = %task.identifier(), backend = %backend_name, error = %e, "fulltext fetch failed");
            }
            task.record_failure(backend_name, e.to_string());
        }
    }
}
