//! Consent-gated, connectivity-aware delivery of finalized metrics.

pub mod backoff;
pub mod cache;
pub mod queue;

pub use backoff::BackoffPolicy;
pub use cache::MetricsCache;
pub use queue::{UploadQueue, UploadState};
