//! In-process stand-ins for the platform collaborators, used by the demo binary.
//!
//! Readings drift randomly around plausible values so the detector and corrector have
//! something to act on.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::info;

use super::{
    AccessibilitySettings, AudioAnalyzer, Collaborators, Connectivity, ConsentPrompt,
    DeviceInfoProvider, ErrorReporter, MetricsRepository, PerformanceMonitor,
    RemoteConfigProvider, SecureStorage,
};
use crate::monitor::types::{
    AccessibilityAudio, AudioAnalysis, FormatInfo, MetricsFilter, OutputDevice, QualityMetrics,
    SettingsUpdate,
};
use crate::privacy::consent::ConsentStatus;

pub struct SimulatedDevice {
    battery_level: Mutex<f64>,
    settings: Mutex<AccessibilityAudio>,
    online: watch::Sender<bool>,
}

impl SimulatedDevice {
    pub fn new(battery_level: f64) -> Self {
        let (online, _) = watch::channel(true);
        Self {
            battery_level: Mutex::new(battery_level),
            settings: Mutex::new(AccessibilityAudio {
                volume: 0.8,
                frequency_adjustment: false,
                volume_normalization: true,
            }),
            online,
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.send_replace(online);
    }

    pub fn settings(&self) -> AccessibilityAudio {
        *self.settings.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl AudioAnalyzer for SimulatedDevice {
    async fn analyze_audio(&self, _path: &Path) -> Result<AudioAnalysis> {
        let mut rng = rand::thread_rng();
        Ok(AudioAnalysis {
            peak_amplitude: rng.gen_range(0.3..1.0),
            rms_db: rng.gen_range(-36.0..-4.0),
            clipping_percentage: rng.gen_range(0.0..2.0),
            snr_db: Some(rng.gen_range(12.0..45.0)),
        })
    }

    async fn analyze_audio_simple(&self, _path: &Path) -> Result<AudioAnalysis> {
        let mut rng = rand::thread_rng();
        Ok(AudioAnalysis {
            peak_amplitude: rng.gen_range(0.3..1.0),
            rms_db: rng.gen_range(-36.0..-4.0),
            clipping_percentage: rng.gen_range(0.0..2.0),
            snr_db: None,
        })
    }

    async fn get_format_info(&self, path: &Path) -> Result<FormatInfo> {
        let codec = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(FormatInfo {
            codec,
            sample_rate: 44_100,
            bit_rate: 128_000,
            channels: 2,
            duration_ms: 90_000,
            file_size: 1_440_000,
        })
    }

    async fn detect_output_device(&self) -> Result<OutputDevice> {
        Ok(OutputDevice::Speaker)
    }

    async fn process_for_elderly(&self, _input: &Path, _output: &Path) -> Result<bool> {
        Ok(true)
    }

    async fn process_simple(&self, _input: &Path, _output: &Path) -> Result<bool> {
        Ok(true)
    }
}

#[async_trait]
impl PerformanceMonitor for SimulatedDevice {
    async fn cpu_usage(&self) -> Result<f64> {
        Ok(rand::thread_rng().gen_range(5.0..90.0))
    }

    async fn battery_drain_rate(&self) -> Result<f64> {
        Ok(rand::thread_rng().gen_range(0.05..0.8))
    }

    async fn battery_level(&self) -> Result<f64> {
        let mut level = self.battery_level.lock().unwrap_or_else(|p| p.into_inner());
        *level = (*level - 0.1).max(0.0);
        Ok(*level)
    }

    async fn is_charging(&self) -> Result<bool> {
        Ok(false)
    }
}

#[async_trait]
impl DeviceInfoProvider for SimulatedDevice {
    async fn device_model(&self) -> Result<String> {
        Ok("Simulated Tablet 10".to_string())
    }

    async fn device_id(&self) -> Result<String> {
        Ok("sim-device-0001".to_string())
    }

    async fn basic_info(&self) -> Result<BTreeMap<String, String>> {
        let mut info = BTreeMap::new();
        info.insert("os".to_string(), std::env::consts::OS.to_string());
        info.insert("arch".to_string(), std::env::consts::ARCH.to_string());
        Ok(info)
    }
}

#[async_trait]
impl AccessibilitySettings for SimulatedDevice {
    async fn current_settings(&self) -> Result<AccessibilityAudio> {
        Ok(self.settings())
    }

    async fn update_settings(&self, update: SettingsUpdate) -> Result<()> {
        let mut settings = self.settings.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(volume) = update.volume {
            settings.volume = volume;
        }
        if let Some(freq) = update.frequency_adjustment {
            settings.frequency_adjustment = freq;
        }
        if let Some(norm) = update.volume_normalization {
            settings.volume_normalization = norm;
        }
        info!(?settings, "accessibility settings changed");
        Ok(())
    }
}

#[async_trait]
impl Connectivity for SimulatedDevice {
    async fn is_connected(&self) -> bool {
        *self.online.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }
}

#[async_trait]
impl ConsentPrompt for SimulatedDevice {
    async fn request_consent(&self) -> Result<ConsentStatus> {
        Ok(ConsentStatus::Granted)
    }
}

#[async_trait]
impl ErrorReporter for SimulatedDevice {
    async fn report(&self, kind: &str, message: &str, correlation_id: &str, context: BTreeMap<String, String>) {
        info!(kind, correlation_id, ?context, "error report: {}", message);
    }
}

#[derive(Default)]
pub struct InMemorySecureStorage {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SecureStorage for InMemorySecureStorage {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().unwrap_or_else(|p| p.into_inner()).get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.lock().unwrap_or_else(|p| p.into_inner()).remove(key);
        Ok(())
    }
}

/// Keeps uploaded batches in memory and logs their size.
#[derive(Default)]
pub struct InMemoryRepository {
    stored: Mutex<Vec<QualityMetrics>>,
}

#[async_trait]
impl MetricsRepository for InMemoryRepository {
    async fn save_metrics_batch(&self, batch: &[QualityMetrics]) -> Result<bool> {
        info!(count = batch.len(), "repository received metrics batch");
        self.stored
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(batch);
        Ok(true)
    }

    async fn get_metrics(&self, filter: &MetricsFilter) -> Result<Vec<QualityMetrics>> {
        let stored = self.stored.lock().unwrap_or_else(|p| p.into_inner());
        let matching = stored
            .iter()
            .filter(|m| filter.session_id.as_ref().map_or(true, |id| &m.session_id == id))
            .filter(|m| filter.since.map_or(true, |since| m.timestamp >= since))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matching)
    }

    async fn clear_metrics(&self, _user_id: &str) -> Result<()> {
        self.stored.lock().unwrap_or_else(|p| p.into_inner()).clear();
        Ok(())
    }
}

/// Serves a fixed remote-config document.
pub struct StaticRemoteConfig(pub Map<String, Value>);

#[async_trait]
impl RemoteConfigProvider for StaticRemoteConfig {
    async fn fetch(&self, _name: &str) -> Result<Map<String, Value>> {
        Ok(self.0.clone())
    }
}

/// Wires every collaborator to the simulated device.
pub fn collaborators(device: Arc<SimulatedDevice>, remote: Map<String, Value>) -> Collaborators {
    Collaborators {
        analyzer: device.clone(),
        performance: device.clone(),
        device: device.clone(),
        repository: Arc::new(InMemoryRepository::default()),
        secure_storage: Arc::new(InMemorySecureStorage::default()),
        accessibility: device.clone(),
        remote_config: Arc::new(StaticRemoteConfig(remote)),
        connectivity: device.clone(),
        consent_prompt: device.clone(),
        error_reporter: device,
    }
}
