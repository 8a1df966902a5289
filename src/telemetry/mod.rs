//! Internal monitor telemetry.
//!
//! # PRIVACY INVARIANT
//! Events carry only ids, counts, durations and enums. Never paths, user ids or context values.
//!
//! Telemetry is a side-effect layer: nothing in the sampling or upload decisions reads it.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use metrics::MonitorTelemetrySnapshot;
pub use recorder::TelemetryRecorder;
