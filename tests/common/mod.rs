#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::watch;

use playback_monitor::monitor::types::{
    AccessibilityAudio, AudioAnalysis, FormatInfo, MetricsFilter, OutputDevice, QualityMetrics,
    SettingsUpdate,
};
use playback_monitor::services::{
    AccessibilitySettings, AudioAnalyzer, Collaborators, Connectivity, ConsentPrompt,
    DeviceInfoProvider, ErrorReporter, MetricsRepository, PerformanceMonitor,
    RemoteConfigProvider, SecureStorage,
};
use playback_monitor::{AudioQualityMonitor, ConsentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Accept,
    Reject,
    Fail,
}

/// One fake device implementing every collaborator, with knobs for each reading and counters
/// for every outgoing call.
pub struct FakePlatform {
    pub battery_level: Mutex<f64>,
    pub charging: AtomicBool,
    pub battery_fails: AtomicBool,
    pub cpu: Mutex<f64>,
    pub drain: Mutex<f64>,
    pub analysis: Mutex<AudioAnalysis>,
    pub analyzer_fails: AtomicBool,
    pub analysis_delay: Mutex<Duration>,
    pub analyze_calls: AtomicUsize,
    pub simple_analyze_calls: AtomicUsize,
    pub elderly_ok: AtomicBool,
    pub simple_ok: AtomicBool,
    pub processing_fails: AtomicBool,

    pub consent_answer: Mutex<ConsentStatus>,
    pub prompt_calls: AtomicUsize,
    pub prompt_delay: Mutex<Duration>,

    pub save_outcome: Mutex<SaveOutcome>,
    pub save_calls: AtomicUsize,
    pub saved: Mutex<Vec<Vec<QualityMetrics>>>,
    pub cleared_for: Mutex<Vec<String>>,
    pub stored_metrics: Mutex<Vec<QualityMetrics>>,

    pub storage: Mutex<HashMap<String, String>>,
    pub storage_fails: AtomicBool,

    pub settings: Mutex<AccessibilityAudio>,
    pub settings_updates: Mutex<Vec<SettingsUpdate>>,

    pub remote: Mutex<Option<Map<String, Value>>>,
    pub reports: Mutex<Vec<(String, String, BTreeMap<String, String>)>>,

    online: watch::Sender<bool>,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        let (online, _) = watch::channel(true);
        Arc::new(Self {
            battery_level: Mutex::new(80.0),
            charging: AtomicBool::new(false),
            battery_fails: AtomicBool::new(false),
            cpu: Mutex::new(20.0),
            drain: Mutex::new(0.1),
            analysis: Mutex::new(AudioAnalysis {
                peak_amplitude: 0.6,
                rms_db: -18.0,
                clipping_percentage: 0.0,
                snr_db: Some(35.0),
            }),
            analyzer_fails: AtomicBool::new(false),
            analysis_delay: Mutex::new(Duration::ZERO),
            analyze_calls: AtomicUsize::new(0),
            simple_analyze_calls: AtomicUsize::new(0),
            elderly_ok: AtomicBool::new(true),
            simple_ok: AtomicBool::new(true),
            processing_fails: AtomicBool::new(false),
            consent_answer: Mutex::new(ConsentStatus::Granted),
            prompt_calls: AtomicUsize::new(0),
            prompt_delay: Mutex::new(Duration::ZERO),
            save_outcome: Mutex::new(SaveOutcome::Accept),
            save_calls: AtomicUsize::new(0),
            saved: Mutex::new(Vec::new()),
            cleared_for: Mutex::new(Vec::new()),
            stored_metrics: Mutex::new(Vec::new()),
            storage: Mutex::new(HashMap::new()),
            storage_fails: AtomicBool::new(false),
            settings: Mutex::new(AccessibilityAudio {
                volume: 0.5,
                frequency_adjustment: false,
                volume_normalization: false,
            }),
            settings_updates: Mutex::new(Vec::new()),
            remote: Mutex::new(Some(Map::new())),
            reports: Mutex::new(Vec::new()),
            online,
        })
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            analyzer: self.clone(),
            performance: self.clone(),
            device: self.clone(),
            repository: self.clone(),
            secure_storage: self.clone(),
            accessibility: self.clone(),
            remote_config: self.clone(),
            connectivity: self.clone(),
            consent_prompt: self.clone(),
            error_reporter: self.clone(),
        }
    }

    pub fn set_remote(&self, remote: Value) {
        *self.remote.lock().unwrap() = remote.as_object().cloned();
    }

    pub fn set_battery(&self, level: f64, charging: bool) {
        *self.battery_level.lock().unwrap() = level;
        self.charging.store(charging, Ordering::SeqCst);
    }

    pub fn set_analysis(&self, analysis: AudioAnalysis) {
        *self.analysis.lock().unwrap() = analysis;
    }

    pub fn set_consent_answer(&self, answer: ConsentStatus) {
        *self.consent_answer.lock().unwrap() = answer;
    }

    pub fn set_save_outcome(&self, outcome: SaveOutcome) {
        *self.save_outcome.lock().unwrap() = outcome;
    }

    pub fn set_online(&self, online: bool) {
        self.online.send_replace(online);
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn uploaded(&self) -> Vec<QualityMetrics> {
        self.saved.lock().unwrap().iter().flatten().cloned().collect()
    }

    pub fn cleared_for(&self) -> Vec<String> {
        self.cleared_for.lock().unwrap().clone()
    }

    pub fn stored(&self, key: &str) -> Option<String> {
        self.storage.lock().unwrap().get(key).cloned()
    }

    pub fn settings_updates(&self) -> Vec<SettingsUpdate> {
        self.settings_updates.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<(String, String, BTreeMap<String, String>)> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioAnalyzer for FakePlatform {
    async fn analyze_audio(&self, _path: &Path) -> Result<AudioAnalysis> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.analysis_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.analyzer_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("decoder crashed on /home/someone/private.mp3"));
        }
        Ok(*self.analysis.lock().unwrap())
    }

    async fn analyze_audio_simple(&self, _path: &Path) -> Result<AudioAnalysis> {
        self.simple_analyze_calls.fetch_add(1, Ordering::SeqCst);
        if self.analyzer_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("simple analysis failed"));
        }
        let mut analysis = *self.analysis.lock().unwrap();
        analysis.snr_db = None;
        Ok(analysis)
    }

    async fn get_format_info(&self, _path: &Path) -> Result<FormatInfo> {
        if self.analyzer_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("format probe failed"));
        }
        Ok(FormatInfo {
            codec: "mp3".to_string(),
            sample_rate: 44_100,
            bit_rate: 128_000,
            channels: 2,
            duration_ms: 60_000,
            file_size: 960_000,
        })
    }

    async fn detect_output_device(&self) -> Result<OutputDevice> {
        Ok(OutputDevice::WiredHeadphones)
    }

    async fn process_for_elderly(&self, _input: &Path, _output: &Path) -> Result<bool> {
        if self.processing_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("dsp unavailable"));
        }
        Ok(self.elderly_ok.load(Ordering::SeqCst))
    }

    async fn process_simple(&self, _input: &Path, _output: &Path) -> Result<bool> {
        if self.processing_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("dsp unavailable"));
        }
        Ok(self.simple_ok.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl PerformanceMonitor for FakePlatform {
    async fn cpu_usage(&self) -> Result<f64> {
        Ok(*self.cpu.lock().unwrap())
    }

    async fn battery_drain_rate(&self) -> Result<f64> {
        Ok(*self.drain.lock().unwrap())
    }

    async fn battery_level(&self) -> Result<f64> {
        if self.battery_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("battery service unavailable"));
        }
        Ok(*self.battery_level.lock().unwrap())
    }

    async fn is_charging(&self) -> Result<bool> {
        if self.battery_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("battery service unavailable"));
        }
        Ok(self.charging.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl DeviceInfoProvider for FakePlatform {
    async fn device_model(&self) -> Result<String> {
        Ok("Pixel 8 Pro".to_string())
    }

    async fn device_id(&self) -> Result<String> {
        Ok("device-123".to_string())
    }

    async fn basic_info(&self) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }
}

#[async_trait]
impl MetricsRepository for FakePlatform {
    async fn save_metrics_batch(&self, batch: &[QualityMetrics]) -> Result<bool> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        match *self.save_outcome.lock().unwrap() {
            SaveOutcome::Accept => {
                self.saved.lock().unwrap().push(batch.to_vec());
                self.stored_metrics.lock().unwrap().extend_from_slice(batch);
                Ok(true)
            }
            SaveOutcome::Reject => Ok(false),
            SaveOutcome::Fail => Err(anyhow!("HTTP 503")),
        }
    }

    async fn get_metrics(&self, filter: &MetricsFilter) -> Result<Vec<QualityMetrics>> {
        let stored = self.stored_metrics.lock().unwrap();
        Ok(stored
            .iter()
            .filter(|m| filter.session_id.as_ref().map_or(true, |id| &m.session_id == id))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn clear_metrics(&self, user_id: &str) -> Result<()> {
        self.cleared_for.lock().unwrap().push(user_id.to_string());
        self.stored_metrics.lock().unwrap().clear();
        Ok(())
    }
}

#[async_trait]
impl SecureStorage for FakePlatform {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        if self.storage_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("keystore locked"));
        }
        Ok(self.storage.lock().unwrap().get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        if self.storage_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("keystore locked"));
        }
        self.storage.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.storage.lock().unwrap().remove(key);
        Ok(())
    }
}

#[async_trait]
impl AccessibilitySettings for FakePlatform {
    async fn current_settings(&self) -> Result<AccessibilityAudio> {
        Ok(*self.settings.lock().unwrap())
    }

    async fn update_settings(&self, update: SettingsUpdate) -> Result<()> {
        self.settings_updates.lock().unwrap().push(update);
        let mut settings = self.settings.lock().unwrap();
        if let Some(volume) = update.volume {
            settings.volume = volume;
        }
        if let Some(freq) = update.frequency_adjustment {
            settings.frequency_adjustment = freq;
        }
        if let Some(norm) = update.volume_normalization {
            settings.volume_normalization = norm;
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteConfigProvider for FakePlatform {
    async fn fetch(&self, _name: &str) -> Result<Map<String, Value>> {
        self.remote
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("remote config unreachable"))
    }
}

#[async_trait]
impl Connectivity for FakePlatform {
    async fn is_connected(&self) -> bool {
        *self.online.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }
}

#[async_trait]
impl ConsentPrompt for FakePlatform {
    async fn request_consent(&self) -> Result<ConsentStatus> {
        self.prompt_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.prompt_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(*self.consent_answer.lock().unwrap())
    }
}

#[async_trait]
impl ErrorReporter for FakePlatform {
    async fn report(&self, kind: &str, message: &str, _correlation_id: &str, context: BTreeMap<String, String>) {
        self.reports
            .lock()
            .unwrap()
            .push((kind.to_string(), message.to_string(), context));
    }
}

/// Remote config that keeps the background scheduler out of the way so tests drive ticks by hand.
pub fn manual_config() -> Value {
    serde_json::json!({
        "debug_sampling_interval_ms": 3_600_000,
        "inter_session_delay_ms": 0,
        "upload_batch_size": 100,
        "max_cache_size": 100,
    })
}

pub async fn monitor(platform: &Arc<FakePlatform>) -> AudioQualityMonitor {
    AudioQualityMonitor::initialize(platform.collaborators(), Some("user-42".to_string())).await
}

/// Lets spawned workers drain their queues. Under a paused clock the runtime only advances time
/// once every task is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
