//! litfetch science: metadata aggregation across literature providers,
//! deduplication, quota balancing and full-text acquisition.

pub mod acquisition;
pub mod aggregation;
pub mod dedup;
pub mod error;
pub mod fetchers;
pub mod http;
pub mod identifiers;
pub mod quota;
pub mod sources;

pub use acquisition::{
    AcquisitionReport, AcquisitionTask, BackendGuesser, BackendRegistry, FetchAdapter, Scheduler,
};
pub use aggregation::{AggregationReport, AggregationRequest, Aggregator, ProviderAdapter, ProviderRegistry};
pub use dedup::{MergeBucket, ProviderPreference};
pub use error::{Result, ScienceError};
pub use quota::balanced_trim;
