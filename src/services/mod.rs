//! Collaborator seams consumed by the monitor.
//!
//! Every call is async and may fail; the core catches failures at the call site and substitutes
//! documented fallbacks, so implementations are free to return errors.

pub mod http_config;
pub mod simulated;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::monitor::types::{
    AccessibilityAudio, AudioAnalysis, FormatInfo, MetricsFilter, OutputDevice, QualityMetrics,
    SettingsUpdate,
};
use crate::privacy::consent::ConsentStatus;

#[async_trait]
pub trait AudioAnalyzer: Send + Sync {
    async fn analyze_audio(&self, path: &Path) -> Result<AudioAnalysis>;
    async fn analyze_audio_simple(&self, path: &Path) -> Result<AudioAnalysis>;
    async fn get_format_info(&self, path: &Path) -> Result<FormatInfo>;
    async fn detect_output_device(&self) -> Result<OutputDevice>;
    async fn process_for_elderly(&self, input: &Path, output: &Path) -> Result<bool>;
    async fn process_simple(&self, input: &Path, output: &Path) -> Result<bool>;
}

#[async_trait]
pub trait PerformanceMonitor: Send + Sync {
    async fn cpu_usage(&self) -> Result<f64>;
    /// Percent of battery per minute.
    async fn battery_drain_rate(&self) -> Result<f64>;
    async fn battery_level(&self) -> Result<f64>;
    async fn is_charging(&self) -> Result<bool>;
}

#[async_trait]
pub trait DeviceInfoProvider: Send + Sync {
    async fn device_model(&self) -> Result<String>;
    async fn device_id(&self) -> Result<String>;
    async fn basic_info(&self) -> Result<BTreeMap<String, String>>;
}

#[async_trait]
pub trait MetricsRepository: Send + Sync {
    async fn save_metrics_batch(&self, batch: &[QualityMetrics]) -> Result<bool>;
    async fn get_metrics(&self, filter: &MetricsFilter) -> Result<Vec<QualityMetrics>>;
    async fn clear_metrics(&self, user_id: &str) -> Result<()>;
}

#[async_trait]
pub trait SecureStorage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>>;
    async fn write(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

#[async_trait]
pub trait AccessibilitySettings: Send + Sync {
    async fn current_settings(&self) -> Result<AccessibilityAudio>;
    async fn update_settings(&self, update: SettingsUpdate) -> Result<()>;
}

#[async_trait]
pub trait RemoteConfigProvider: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<serde_json::Map<String, serde_json::Value>>;
}

#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_connected(&self) -> bool;
    /// Receives `true` whenever the network comes back and `false` when it drops.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Asks the user for metrics consent. The dialog itself lives outside this crate.
#[async_trait]
pub trait ConsentPrompt: Send + Sync {
    async fn request_consent(&self) -> Result<ConsentStatus>;
}

#[async_trait]
pub trait ErrorReporter: Send + Sync {
    /// `context` must never carry raw PII.
    async fn report(&self, kind: &str, message: &str, correlation_id: &str, context: BTreeMap<String, String>);
}

/// Everything the monitor needs from the outside world.
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn AudioAnalyzer>,
    pub performance: Arc<dyn PerformanceMonitor>,
    pub device: Arc<dyn DeviceInfoProvider>,
    pub repository: Arc<dyn MetricsRepository>,
    pub secure_storage: Arc<dyn SecureStorage>,
    pub accessibility: Arc<dyn AccessibilitySettings>,
    pub remote_config: Arc<dyn RemoteConfigProvider>,
    pub connectivity: Arc<dyn Connectivity>,
    pub consent_prompt: Arc<dyn ConsentPrompt>,
    pub error_reporter: Arc<dyn ErrorReporter>,
}
