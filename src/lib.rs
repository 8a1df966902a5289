pub mod config;
pub mod error;
pub mod monitor;
pub mod privacy;
pub mod services;
pub mod telemetry;
pub mod upload;

pub use config::{ConfigurationManager, MonitorConfig, SecurityTier};
pub use error::{MonitorError, Result};
pub use monitor::{AudioQualityMonitor, MonitoringState, QualityIssue, QualityMetrics, SessionHandle};
pub use privacy::ConsentStatus;
pub use services::Collaborators;
