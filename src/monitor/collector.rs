use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::report::FailureSink;
use super::types::{AudioAnalysis, BatteryMode, FormatInfo, OutputDevice, PlaybackSession, QualityMetrics};
use crate::config::{BatteryPolicy, MonitorConfig};
use crate::services::{AudioAnalyzer, PerformanceMonitor};

/// Battery reading used for policy decisions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerReading {
    pub level: f64,
    pub charging: bool,
    pub mode: BatteryMode,
}

impl PowerReading {
    pub fn classify(level: f64, charging: bool, policy: &BatteryPolicy) -> Self {
        let mode = if charging {
            BatteryMode::Normal
        } else if level <= policy.critical_threshold {
            BatteryMode::Critical
        } else if level <= policy.low_threshold {
            BatteryMode::Reduced
        } else {
            BatteryMode::Normal
        };
        Self { level, charging, mode }
    }
}

/// Merges analyzer and performance-probe readings into one `QualityMetrics`.
///
/// No collaborator failure escapes: each reading has a fallback.
/// - analysis: silence floor (`AudioAnalysis::fallback`)
/// - cpu: 0 %
/// - battery drain: absent
/// - output device: `Unknown`
/// - battery level: 100 % and not charging, so a broken probe never blocks monitoring
pub struct MetricsCollector {
    analyzer: Arc<dyn AudioAnalyzer>,
    performance: Arc<dyn PerformanceMonitor>,
    failures: FailureSink,
}

impl MetricsCollector {
    pub fn new(
        analyzer: Arc<dyn AudioAnalyzer>,
        performance: Arc<dyn PerformanceMonitor>,
        failures: FailureSink,
    ) -> Self {
        Self {
            analyzer,
            performance,
            failures,
        }
    }

    pub async fn power(&self, policy: &BatteryPolicy, correlation_id: &str) -> PowerReading {
        let level = match self.performance.battery_level().await {
            Ok(level) => level,
            Err(e) => {
                self.failures.collaborator_failed("battery_level", &e, correlation_id).await;
                100.0
            }
        };
        let charging = match self.performance.is_charging().await {
            Ok(charging) => charging,
            Err(e) => {
                self.failures.collaborator_failed("charging_state", &e, correlation_id).await;
                false
            }
        };
        PowerReading::classify(level, charging, policy)
    }

    pub async fn format_info(&self, path: &Path, correlation_id: &str) -> FormatInfo {
        match self.analyzer.get_format_info(path).await {
            Ok(info) => info,
            Err(e) => {
                self.failures.collaborator_failed("format_info", &e, correlation_id).await;
                FormatInfo::unknown()
            }
        }
    }

    pub async fn collect(
        &self,
        session: &PlaybackSession,
        mode: BatteryMode,
        config: &MonitorConfig,
        completion_percentage: f64,
        engagement_score: Option<f64>,
    ) -> QualityMetrics {
        let cid = session.correlation_id.as_str();

        // 1. Audio analysis (simplified while the battery is low)
        let analysis = if mode.is_reduced() {
            self.analyzer.analyze_audio_simple(&session.audio_path).await
        } else {
            self.analyzer.analyze_audio(&session.audio_path).await
        };
        let analysis = match analysis {
            Ok(a) => a,
            Err(e) => {
                self.failures.collaborator_failed("audio_analysis", &e, cid).await;
                AudioAnalysis::fallback()
            }
        };

        // 2. Performance probes
        let cpu_percentage = if config.features.cpu_monitoring {
            match self.performance.cpu_usage().await {
                Ok(cpu) => cpu,
                Err(e) => {
                    self.failures.collaborator_failed("cpu_usage", &e, cid).await;
                    0.0
                }
            }
        } else {
            0.0
        };

        let battery_drain_rate = if config.features.battery_monitoring {
            match self.performance.battery_drain_rate().await {
                Ok(rate) => Some(rate),
                Err(e) => {
                    self.failures.collaborator_failed("battery_drain", &e, cid).await;
                    None
                }
            }
        } else {
            None
        };

        // 3. Output route
        let output_device = match self.analyzer.detect_output_device().await {
            Ok(device) => device,
            Err(e) => {
                self.failures.collaborator_failed("output_device", &e, cid).await;
                OutputDevice::Unknown
            }
        };

        debug!(correlation_id = cid, ?mode, "sample collected");

        QualityMetrics {
            session_id: session.id.clone(),
            correlation_id: session.correlation_id.clone(),
            app_version: config.app_version.clone(),
            timestamp: Utc::now(),
            peak_amplitude: analysis.peak_amplitude,
            rms_db: analysis.rms_db,
            clipping_percentage: analysis.clipping_percentage,
            snr_db: analysis.snr_db,
            cpu_percentage,
            battery_drain_rate,
            completion_percentage,
            engagement_score,
            output_device,
            format: session.format.clone(),
            device_model: session.device_model.clone(),
            nudge_id: session.nudge_id.clone(),
            user_id: session.user_id.clone(),
            context: if config.features.context_collection && !session.context.is_empty() {
                Some(session.context.clone())
            } else {
                None
            },
        }
    }
}

/// Playback progress estimated from wall-clock time, for samples taken mid-session.
pub fn elapsed_completion(session: &PlaybackSession, now: DateTime<Utc>) -> f64 {
    if session.format.duration_ms == 0 {
        return 0.0;
    }
    let elapsed_ms = (now - session.started_at).num_milliseconds().max(0) as f64;
    (elapsed_ms / session.format.duration_ms as f64 * 100.0).clamp(0.0, 100.0)
}
