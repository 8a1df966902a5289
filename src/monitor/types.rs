use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sanitized, free-form context attached to a session and copied into its metrics.
pub type SessionContext = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub codec: String,
    pub sample_rate: u32,
    pub bit_rate: u32,
    pub channels: u16,
    pub duration_ms: u64,
    pub file_size: u64,
}

impl FormatInfo {
    /// Used when the analyzer cannot describe the file.
    pub fn unknown() -> Self {
        Self {
            codec: "unknown".to_string(),
            sample_rate: 0,
            bit_rate: 0,
            channels: 0,
            duration_ms: 0,
            file_size: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputDevice {
    Speaker,
    WiredHeadphones,
    Bluetooth,
    HearingAid,
    Unknown,
}

/// Raw analyzer output for one pass over the audio resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioAnalysis {
    pub peak_amplitude: f64,
    pub rms_db: f64,
    pub clipping_percentage: f64,
    pub snr_db: Option<f64>,
}

impl AudioAnalysis {
    /// Silence-floor values substituted when the analyzer fails.
    pub fn fallback() -> Self {
        Self {
            peak_amplitude: 0.0,
            rms_db: -60.0,
            clipping_percentage: 0.0,
            snr_db: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSession {
    pub id: String,
    pub audio_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub format: FormatInfo,
    pub device_model: String,
    pub nudge_id: Option<String>,
    /// Encrypted when privacy mode is on.
    pub user_id: Option<String>,
    pub correlation_id: String,
    pub context: SessionContext,
}

/// One immutable quality sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub session_id: String,
    pub correlation_id: String,
    pub app_version: String,
    pub timestamp: DateTime<Utc>,

    pub peak_amplitude: f64,
    pub rms_db: f64,
    pub clipping_percentage: f64,
    pub snr_db: Option<f64>,

    pub cpu_percentage: f64,
    pub battery_drain_rate: Option<f64>,

    pub completion_percentage: f64,
    pub engagement_score: Option<f64>,

    pub output_device: OutputDevice,
    pub format: FormatInfo,
    pub device_model: String,
    pub nudge_id: Option<String>,
    pub user_id: Option<String>,
    pub context: Option<SessionContext>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QualityIssue {
    Clipping,
    LowVolume,
    HighVolume,
    BackgroundNoise,
    PerformanceIssues,
    BatteryDrain,
    LowEngagement,
}

/// Power policy derived from battery level and charging state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryMode {
    Normal,
    Reduced,
    Critical,
}

impl BatteryMode {
    pub fn is_reduced(self) -> bool {
        !matches!(self, BatteryMode::Normal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradedReason {
    CriticalBattery,
    ConsentNotGranted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitoringState {
    Active,
    Degraded(DegradedReason),
}

/// Returned by `start_session`. A degraded handle is a real session id that is not sampled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: String,
    pub state: MonitoringState,
}

impl SessionHandle {
    pub fn is_monitored(&self) -> bool {
        self.state == MonitoringState::Active
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsFilter {
    pub session_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Snapshot of the user's accessibility audio settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityAudio {
    pub volume: f64,
    pub frequency_adjustment: bool,
    pub volume_normalization: bool,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub volume: Option<f64>,
    pub frequency_adjustment: Option<bool>,
    pub volume_normalization: Option<bool>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.volume.is_none()
            && self.frequency_adjustment.is_none()
            && self.volume_normalization.is_none()
    }
}
