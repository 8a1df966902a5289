//! Typed monitor configuration.
//!
//! Remote config arrives as an untyped JSON map. `MonitorConfig::from_remote` decodes it field by
//! field; anything missing, mistyped or out of range keeps its hardcoded default.

pub mod manager;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub use manager::ConfigurationManager;

/// Ordered by strength; anything above `Standard` persists its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityTier {
    Standard,
    Enhanced,
    Maximum,
}

impl SecurityTier {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(SecurityTier::Standard),
            "enhanced" => Some(SecurityTier::Enhanced),
            "maximum" => Some(SecurityTier::Maximum),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub clipping_percentage: f64,
    pub low_volume_db: f64,
    pub high_volume_db: f64,
    pub min_snr_db: f64,
    pub cpu_percentage: f64,
    pub battery_drain_per_min: f64,
    pub low_engagement: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            clipping_percentage: 1.0,
            low_volume_db: -30.0,
            high_volume_db: -6.0,
            min_snr_db: 20.0,
            cpu_percentage: 80.0,
            battery_drain_per_min: 0.5,
            low_engagement: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryPolicy {
    /// Percent at or below which sampling slows down and analysis is simplified.
    pub low_threshold: f64,
    /// Percent at or below which new sessions are not sampled at all.
    pub critical_threshold: f64,
}

impl Default for BatteryPolicy {
    fn default() -> Self {
        Self {
            low_threshold: 30.0,
            critical_threshold: 15.0,
        }
    }
}

/// Upper bound for a single retry delay, whatever the remote config asks for.
pub const MAX_RETRY_DELAY: Duration = Duration::from_millis(60_000);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPolicy {
    pub batch_size: usize,
    pub max_cache_size: usize,
    pub base_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub max_jitter: Duration,
    pub max_retry_attempts: u32,
    pub cooldown: Duration,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_cache_size: 100,
            base_retry_delay: Duration::from_secs(1),
            max_retry_delay: MAX_RETRY_DELAY,
            max_jitter: Duration::from_secs(1),
            max_retry_attempts: 5,
            cooldown: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureToggles {
    pub cpu_monitoring: bool,
    pub battery_monitoring: bool,
    pub auto_correction: bool,
    pub uploads: bool,
    pub context_collection: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            cpu_monitoring: true,
            battery_monitoring: true,
            auto_correction: true,
            uploads: true,
            context_collection: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub sampling_interval: Duration,
    pub low_battery_sampling_interval: Duration,
    /// Overrides the battery-tiered interval when set.
    pub debug_sampling_interval: Option<Duration>,
    pub inter_session_delay: Duration,
    pub thresholds: QualityThresholds,
    pub battery: BatteryPolicy,
    pub upload: UploadPolicy,
    pub security_tier: SecurityTier,
    pub privacy_mode: bool,
    pub consent_retention_days: i64,
    pub features: FeatureToggles,
    pub app_version: String,
}

/// Multiplier applied to the normal interval while the battery is critical.
pub const CRITICAL_INTERVAL_FACTOR: u32 = 10;

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_secs(5),
            low_battery_sampling_interval: Duration::from_secs(15),
            debug_sampling_interval: None,
            inter_session_delay: Duration::from_millis(100),
            thresholds: QualityThresholds::default(),
            battery: BatteryPolicy::default(),
            upload: UploadPolicy::default(),
            security_tier: SecurityTier::Enhanced,
            privacy_mode: true,
            consent_retention_days: 365,
            features: FeatureToggles::default(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl MonitorConfig {
    /// Decodes a remote-config map. Never fails.
    pub fn from_remote(map: &Map<String, Value>) -> Self {
        let d = MonitorConfig::default();
        let r = RemoteFields(map);

        let thresholds = QualityThresholds {
            clipping_percentage: r.f64_in("clipping_threshold", 0.0, 100.0)
                .unwrap_or(d.thresholds.clipping_percentage),
            low_volume_db: r.f64_in("low_volume_threshold_db", -120.0, 0.0)
                .unwrap_or(d.thresholds.low_volume_db),
            high_volume_db: r.f64_in("high_volume_threshold_db", -120.0, 0.0)
                .unwrap_or(d.thresholds.high_volume_db),
            min_snr_db: r.f64_in("min_snr_db", 0.0, 120.0).unwrap_or(d.thresholds.min_snr_db),
            cpu_percentage: r.f64_in("cpu_threshold", 0.0, 100.0)
                .unwrap_or(d.thresholds.cpu_percentage),
            battery_drain_per_min: r.f64_in("battery_drain_threshold", 0.0, 100.0)
                .unwrap_or(d.thresholds.battery_drain_per_min),
            low_engagement: r.f64_in("low_engagement_threshold", 0.0, 1.0)
                .unwrap_or(d.thresholds.low_engagement),
        };

        let mut battery = BatteryPolicy {
            low_threshold: r.f64_in("low_battery_threshold", 0.0, 100.0)
                .unwrap_or(d.battery.low_threshold),
            critical_threshold: r.f64_in("critical_battery_threshold", 0.0, 100.0)
                .unwrap_or(d.battery.critical_threshold),
        };
        if battery.critical_threshold > battery.low_threshold {
            battery = d.battery.clone();
        }

        let upload = UploadPolicy {
            batch_size: r.usize_min("upload_batch_size", 1).unwrap_or(d.upload.batch_size),
            max_cache_size: r.usize_min("max_cache_size", 1).unwrap_or(d.upload.max_cache_size),
            base_retry_delay: r.millis("retry_base_delay_ms").unwrap_or(d.upload.base_retry_delay),
            max_retry_delay: r.millis_max("retry_max_delay_ms", MAX_RETRY_DELAY)
                .unwrap_or(d.upload.max_retry_delay),
            max_jitter: r.millis("retry_max_jitter_ms").unwrap_or(d.upload.max_jitter),
            max_retry_attempts: r.usize_min("max_retry_attempts", 1)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(d.upload.max_retry_attempts),
            cooldown: r.millis("retry_cooldown_ms").unwrap_or(d.upload.cooldown),
        };

        let features = FeatureToggles {
            cpu_monitoring: r.bool("enable_cpu_monitoring").unwrap_or(d.features.cpu_monitoring),
            battery_monitoring: r.bool("enable_battery_monitoring")
                .unwrap_or(d.features.battery_monitoring),
            auto_correction: r.bool("enable_auto_correction").unwrap_or(d.features.auto_correction),
            uploads: r.bool("enable_uploads").unwrap_or(d.features.uploads),
            context_collection: r.bool("enable_context_collection")
                .unwrap_or(d.features.context_collection),
        };

        Self {
            sampling_interval: r.millis_min("sampling_interval_ms", 100)
                .unwrap_or(d.sampling_interval),
            low_battery_sampling_interval: r.millis_min("low_battery_sampling_interval_ms", 100)
                .unwrap_or(d.low_battery_sampling_interval),
            debug_sampling_interval: r.millis_min("debug_sampling_interval_ms", 100)
                .or(d.debug_sampling_interval),
            inter_session_delay: r.millis("inter_session_delay_ms").unwrap_or(d.inter_session_delay),
            thresholds,
            battery,
            upload,
            security_tier: r.str("security_tier")
                .and_then(SecurityTier::parse)
                .unwrap_or(d.security_tier),
            privacy_mode: r.bool("privacy_mode").unwrap_or(d.privacy_mode),
            consent_retention_days: r.usize_min("consent_retention_days", 1)
                .and_then(|v| i64::try_from(v).ok())
                .unwrap_or(d.consent_retention_days),
            features,
            app_version: r.str("app_version").map(str::to_string).unwrap_or(d.app_version),
        }
    }
}

struct RemoteFields<'a>(&'a Map<String, Value>);

impl RemoteFields<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        let value = self.0.get(key);
        if value.is_none() {
            debug!(key, "remote config field missing, using default");
        }
        value
    }

    fn f64_in(&self, key: &str, min: f64, max: f64) -> Option<f64> {
        self.get(key)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite() && *v >= min && *v <= max)
    }

    fn usize_min(&self, key: &str, min: usize) -> Option<usize> {
        self.get(key)
            .and_then(Value::as_u64)
            .and_then(|v| usize::try_from(v).ok())
            .filter(|v| *v >= min)
    }

    fn millis(&self, key: &str) -> Option<Duration> {
        self.get(key).and_then(Value::as_u64).map(Duration::from_millis)
    }

    fn millis_max(&self, key: &str, max: Duration) -> Option<Duration> {
        self.millis(key).filter(|v| *v <= max)
    }

    fn millis_min(&self, key: &str, min_ms: u64) -> Option<Duration> {
        self.get(key)
            .and_then(Value::as_u64)
            .filter(|v| *v >= min_ms)
            .map(Duration::from_millis)
    }

    fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn empty_map_yields_defaults() {
        assert_eq!(MonitorConfig::from_remote(&Map::new()), MonitorConfig::default());
    }

    #[test]
    fn bad_fields_fall_back_individually() {
        let cfg = MonitorConfig::from_remote(&map(json!({
            "clipping_threshold": "lots",
            "cpu_threshold": 65.0,
            "sampling_interval_ms": 2000,
            "upload_batch_size": 0,
            "security_tier": "maximum",
        })));

        assert_eq!(cfg.thresholds.clipping_percentage, 1.0);
        assert_eq!(cfg.thresholds.cpu_percentage, 65.0);
        assert_eq!(cfg.sampling_interval, Duration::from_secs(2));
        assert_eq!(cfg.upload.batch_size, 10);
        assert_eq!(cfg.security_tier, SecurityTier::Maximum);
    }

    #[test]
    fn retry_cap_never_exceeds_a_minute() {
        let cfg = MonitorConfig::from_remote(&map(json!({ "retry_max_delay_ms": 600_000 })));
        assert_eq!(cfg.upload.max_retry_delay, MAX_RETRY_DELAY);

        let cfg = MonitorConfig::from_remote(&map(json!({ "retry_max_delay_ms": 20_000 })));
        assert_eq!(cfg.upload.max_retry_delay, Duration::from_secs(20));
    }

    #[test]
    fn inverted_battery_thresholds_are_rejected() {
        let cfg = MonitorConfig::from_remote(&map(json!({
            "low_battery_threshold": 10.0,
            "critical_battery_threshold": 40.0,
        })));
        assert_eq!(cfg.battery, BatteryPolicy::default());
    }
}
