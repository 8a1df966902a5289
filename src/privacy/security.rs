use std::fmt;
use std::sync::Arc;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{info, warn};

use super::sanitize::is_pii_key;
use crate::config::SecurityTier;
use crate::error::{MonitorError, Result};
use crate::monitor::types::QualityMetrics;
use crate::services::SecureStorage;
use crate::telemetry::event::MonitorEvent;
use crate::telemetry::recorder::TelemetryRecorder;

pub const KEY_STORAGE_KEY: &str = "audio_quality_encryption_key";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const MAX_CLOCK_SKEW_MINUTES: i64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum ComplianceViolation {
    PiiContextKey(String),
    FutureTimestamp(DateTime<Utc>),
    OutOfRange { field: &'static str, value: f64 },
}

impl fmt::Display for ComplianceViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // The key itself may be sensitive; only its presence is reported.
            Self::PiiContextKey(_) => write!(f, "context carries a personal-data key"),
            Self::FutureTimestamp(ts) => write!(f, "timestamp {ts} is in the future"),
            Self::OutOfRange { field, value } => write!(f, "{field} = {value} is out of range"),
        }
    }
}

/// Identifier encryption and outgoing-record compliance.
pub struct SecurityModule {
    cipher: Aes256Gcm,
    persistent_key: bool,
    telemetry: Arc<TelemetryRecorder>,
}

impl SecurityModule {
    /// Tiers above `Standard` load (or create and store) a persistent key. `Standard` keeps a
    /// process-lifetime key. A storage failure degrades to an in-memory key instead of failing.
    pub async fn initialize(
        tier: SecurityTier,
        storage: &dyn SecureStorage,
        telemetry: Arc<TelemetryRecorder>,
    ) -> Self {
        let (key, persistent_key) = if tier > SecurityTier::Standard {
            match load_or_create_key(storage).await {
                Ok(key) => (key, true),
                Err(e) => {
                    warn!(error = %e, ?tier, "persistent key unavailable, using in-memory key");
                    (random_key(), false)
                }
            }
        } else {
            (random_key(), false)
        };
        info!(?tier, persistent_key, "security module ready");

        Self {
            cipher: Aes256Gcm::new(&Key::<Aes256Gcm>::from(key)),
            persistent_key,
            telemetry,
        }
    }

    pub fn has_persistent_key(&self) -> bool {
        self.persistent_key
    }

    /// AES-256-GCM with a fresh nonce; output is base64 of `nonce || ciphertext`.
    pub fn encrypt_identifier(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| MonitorError::Crypto("identifier encryption failed".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    pub fn decrypt_identifier(&self, token: &str) -> Result<String> {
        let raw = BASE64
            .decode(token.as_bytes())
            .map_err(|e| MonitorError::Crypto(format!("bad identifier encoding: {e}")))?;
        if raw.len() <= NONCE_LEN {
            return Err(MonitorError::Crypto("identifier token too short".into()));
        }
        let (nonce_raw, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_raw), ciphertext)
            .map_err(|_| MonitorError::Crypto("identifier decryption failed".into()))?;
        String::from_utf8(plaintext).map_err(|_| MonitorError::Crypto("identifier is not utf-8".into()))
    }

    pub fn validate_for_compliance(
        &self,
        metrics: &QualityMetrics,
    ) -> std::result::Result<(), Vec<ComplianceViolation>> {
        validate_metrics(metrics, Utc::now())
    }

    /// Validates and, when non-compliant, anonymizes. Records are never dropped here.
    pub fn enforce(&self, metrics: QualityMetrics) -> QualityMetrics {
        match self.validate_for_compliance(&metrics) {
            Ok(()) => metrics,
            Err(violations) => {
                let reasons: Vec<String> = violations.iter().map(ToString::to_string).collect();
                warn!(
                    correlation_id = %metrics.correlation_id,
                    violations = ?reasons,
                    "metrics failed compliance, anonymizing"
                );
                self.telemetry.record(MonitorEvent::ComplianceAnonymized {
                    violations: violations.len(),
                });
                anonymize(metrics)
            }
        }
    }
}

pub fn validate_metrics(
    metrics: &QualityMetrics,
    now: DateTime<Utc>,
) -> std::result::Result<(), Vec<ComplianceViolation>> {
    let mut violations = Vec::new();

    if let Some(context) = &metrics.context {
        for key in context.keys().filter(|k| is_pii_key(k)) {
            violations.push(ComplianceViolation::PiiContextKey(key.clone()));
        }
    }

    if metrics.timestamp > now + ChronoDuration::minutes(MAX_CLOCK_SKEW_MINUTES) {
        violations.push(ComplianceViolation::FutureTimestamp(metrics.timestamp));
    }

    let mut check = |field: &'static str, value: f64, min: f64, max: f64| {
        if !(value >= min && value <= max) {
            violations.push(ComplianceViolation::OutOfRange { field, value });
        }
    };
    check("peak_amplitude", metrics.peak_amplitude, 0.0, 1.0);
    check("rms_db", metrics.rms_db, -160.0, 0.0);
    check("clipping_percentage", metrics.clipping_percentage, 0.0, 100.0);
    check("cpu_percentage", metrics.cpu_percentage, 0.0, 100.0);
    check("completion_percentage", metrics.completion_percentage, 0.0, 100.0);
    if let Some(snr) = metrics.snr_db {
        check("snr_db", snr, -100.0, 200.0);
    }
    if let Some(drain) = metrics.battery_drain_rate {
        check("battery_drain_rate", drain, 0.0, 100.0);
    }
    if let Some(engagement) = metrics.engagement_score {
        check("engagement_score", engagement, 0.0, 1.0);
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Keeps only what cannot identify the user: the device model is cut to its first token and
/// nudge id, user id and context are dropped.
pub fn anonymize(metrics: QualityMetrics) -> QualityMetrics {
    let device_model = metrics
        .device_model
        .split_whitespace()
        .next()
        .unwrap_or("unknown")
        .to_string();
    QualityMetrics {
        device_model,
        nudge_id: None,
        user_id: None,
        context: None,
        ..metrics
    }
}

fn random_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

async fn load_or_create_key(storage: &dyn SecureStorage) -> Result<[u8; KEY_LEN]> {
    let stored = storage
        .read(KEY_STORAGE_KEY)
        .await
        .map_err(|e| MonitorError::Storage(format!("{e:#}")))?;

    if let Some(encoded) = stored {
        match BASE64.decode(encoded.trim().as_bytes()) {
            Ok(decoded) if decoded.len() == KEY_LEN => {
                let mut key = [0u8; KEY_LEN];
                key.copy_from_slice(&decoded);
                return Ok(key);
            }
            _ => warn!("stored encryption key is malformed, generating a new one"),
        }
    }

    let key = random_key();
    storage
        .write(KEY_STORAGE_KEY, &BASE64.encode(key))
        .await
        .map_err(|e| MonitorError::Storage(format!("{e:#}")))?;
    Ok(key)
}
