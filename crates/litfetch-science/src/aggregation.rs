use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use litfetch_core::{MetadataConfig, Record};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dedup::{MergeBucket, ProviderPreference, provider_key};
use crate::error::{Result, ScienceError};
use crate::quota::balanced_trim;

/// A bibliographic catalog that can be searched by free-text query.
///
/// Zero hits is `Ok(vec![])`; only transport or payload failures are errors.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, cap: usize) -> Result<Vec<Record>>;
}

/// Provider adapters keyed by lowercased name.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    adapters: BTreeMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        let key = provider_key(adapter.name());
        if self.adapters.insert(key.clone(), adapter).is_some() {
            debug!(provider = %key, "replaced registered provider");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider_key(name)).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Caller overrides for one run; unset fields fall back to `MetadataConfig`.
#[derive(Debug, Clone, Default)]
pub struct AggregationRequest {
    pub query: Option<String>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderOutcome {
    pub provider: String,
    pub query: String,
    pub cap: usize,
    pub fetched: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationReport {
    pub records: Vec<Record>,
    pub providers: Vec<ProviderOutcome>,
    pub requested_cap: usize,
    pub effective_cap: usize,
    pub cap_raised: bool,
    pub trimmed: bool,
}

impl AggregationReport {
    pub fn failed_providers(&self) -> impl Iterator<Item = &ProviderOutcome> {
        self.providers.iter().filter(|p| p.error.is_some())
    }
}

/// Drives every enabled provider once, merging their output into one
/// deduplicated, quota-balanced record set.
pub struct Aggregator {
    registry: ProviderRegistry,
    config: MetadataConfig,
}

impl Aggregator {
    pub fn new(registry: ProviderRegistry, config: MetadataConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &MetadataConfig {
        &self.config
    }

    /// Pick the query a provider should receive.
    ///
    /// A caller-supplied query that differs from the configured default wins;
    /// otherwise a per-provider override applies; otherwise the base query.
    pub fn resolve_query(&self, provider: &str, base_query: &str) -> String {
        let base = base_query.trim();
        let default = self.config.default_query.trim();
        if !base.is_empty() && base != default {
            return base.to_string();
        }
        if let Some(custom) = self.config.query_overrides().get(&provider_key(provider)) {
            let custom = custom.trim();
            if !custom.is_empty() {
                return custom.to_string();
            }
        }
        if base.is_empty() { default } else { base }.to_string()
    }

    /// Enabled providers that have a registered adapter, in configured order.
    fn active_providers(&self) -> Vec<(String, Arc<dyn ProviderAdapter>)> {
        let mut active: Vec<(String, Arc<dyn ProviderAdapter>)> = Vec::new();
        for name in &self.config.providers {
            let key = provider_key(name);
            if active.iter().any(|(k, _)| *k == key) {
                continue;
            }
            match self.registry.get(&key) {
                Some(adapter) => active.push((key, adapter)),
                None => warn!(provider = %name, "unknown provider, skipping"),
            }
        }
        active
    }

    pub async fn run(&self, request: AggregationRequest) -> Result<AggregationReport> {
        let providers = self.active_providers();
        if providers.is_empty() {
            return Err(ScienceError::Configuration(
                "no enabled metadata provider is registered".to_string(),
            ));
        }

        let base_query = request
            .query
            .unwrap_or_else(|| self.config.default_query.clone());
        let requested_cap = request.max_results.unwrap_or(self.config.max_results).max(1);

        let explicit = self.config.explicit_caps();
        let explicit_sum: usize = providers
            .iter()
            .filter_map(|(key, _)| explicit.get(key))
            .sum();
        let cap_raised = explicit_sum > requested_cap;
        let effective_cap = if cap_raised {
            info!(
                requested = requested_cap,
                explicit_sum,
                "per-provider caps exceed the requested cap, raising effective cap to {explicit_sum}"
            );
            explicit_sum
        } else {
            requested_cap
        };

        info!(query = %base_query, providers = providers.len(), "starting metadata aggregation");

        let preference = ProviderPreference::new(self.config.preference_order());
        let mut bucket = MergeBucket::new(preference.clone());
        let mut outcomes = Vec::with_capacity(providers.len());
        let call_timeout = self.config.provider_timeout_secs.map(Duration::from_secs);
        let delay = Duration::from_millis(self.config.provider_delay_ms);

        for (key, adapter) in providers {
            let query = self.resolve_query(&key, &base_query);
            if query != base_query.trim() {
                debug!(provider = %key, query = %query, "provider uses custom query");
            }
            let cap = explicit.get(&key).copied().unwrap_or(requested_cap);

            info!(provider = %key, cap, "querying provider");
            let result = match call_timeout {
                Some(limit) => match tokio::time::timeout(limit, adapter.search(&query, cap)).await {
                    Ok(result) => result,
                    Err(_) => Err(ScienceError::ProviderUnavailable(
                        key.clone(),
                        format!("timed out after {}s", limit.as_secs()),
                    )),
                },
                None => adapter.search(&query, cap).await,
            };

            let mut outcome = ProviderOutcome {
                provider: key.clone(),
                query,
                cap,
                fetched: 0,
                error: None,
            };

            match result {
                Ok(records) if records.is_empty() => {
                    debug!(provider = %key, "provider returned no records");
                }
                Ok(records) => {
                    outcome.fetched = records.len();
                    let tagged = records.into_iter().map(|record| {
                        if record.source_provider.trim().is_empty() {
                            record.with_source_provider(key.clone())
                        } else {
                            record
                        }
                    });
                    let stats = bucket.extend(tagged, &key);
                    info!(
                        provider = %key,
                        fetched = outcome.fetched,
                        new = stats.inserted,
                        merged = stats.merged,
                        "provider records merged"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    warn!(provider = %key, error = %e, "provider failed, skipping");
                    outcome.error = Some(e.to_string());
                }
            }
            outcomes.push(outcome);
        }

        let mut records = bucket.into_records();
        let trimmed = records.len() > effective_cap;
        if trimmed {
            info!(
                total = records.len(),
                cap = effective_cap,
                "aggregated records exceed cap, balancing across providers"
            );
            records = balanced_trim(records, effective_cap, &preference);
        }

        info!(records = records.len(), "metadata aggregation finished");
        Ok(AggregationReport {
            records,
            providers: outcomes,
            requested_cap,
            effective_cap,
            cap_raised,
            trimmed,
        })
    }
}
