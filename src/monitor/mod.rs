//! Session-scoped playback quality monitoring: registry, adaptive sampling, collection,
//! issue detection and correction.

pub mod collector;
pub mod corrector;
pub mod detector;
#[allow(clippy::module_inception)]
pub mod monitor;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod types;

pub use monitor::AudioQualityMonitor;
pub use types::{MonitoringState, QualityIssue, QualityMetrics, SessionHandle};
