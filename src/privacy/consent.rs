use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::services::{ConsentPrompt, SecureStorage};
use crate::telemetry::event::MonitorEvent;
use crate::telemetry::recorder::TelemetryRecorder;

pub const CONSENT_STORAGE_KEY: &str = "audio_quality_consent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Unknown,
    Granted,
    Denied,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub status: ConsentStatus,
    pub granted_at: Option<DateTime<Utc>>,
}

impl ConsentRecord {
    fn unknown() -> Self {
        Self {
            status: ConsentStatus::Unknown,
            granted_at: None,
        }
    }

    fn is_expired(&self, retention_days: i64, now: DateTime<Utc>) -> bool {
        match (self.status, self.granted_at) {
            (ConsentStatus::Granted, Some(at)) => now - at > ChronoDuration::days(retention_days),
            // A grant without a timestamp cannot be aged, so it is not trusted.
            (ConsentStatus::Granted, None) => true,
            _ => false,
        }
    }
}

/// Consent lifecycle:
/// `unknown -> granted | denied`, `granted -> revoked` (explicit) and
/// `granted -> unknown` once the grant is older than the retention window.
///
/// The record is guarded by its own lock; nothing else is locked while it is held.
pub struct ConsentManager {
    storage: Arc<dyn SecureStorage>,
    prompt: Arc<dyn ConsentPrompt>,
    telemetry: Arc<TelemetryRecorder>,
    retention_days: AtomicI64,
    record: Mutex<ConsentRecord>,
    /// Serializes prompts without blocking readers of `record`.
    prompting: Mutex<()>,
}

impl ConsentManager {
    pub fn new(
        storage: Arc<dyn SecureStorage>,
        prompt: Arc<dyn ConsentPrompt>,
        telemetry: Arc<TelemetryRecorder>,
        retention_days: i64,
    ) -> Self {
        Self {
            storage,
            prompt,
            telemetry,
            retention_days: AtomicI64::new(retention_days),
            record: Mutex::new(ConsentRecord::unknown()),
            prompting: Mutex::new(()),
        }
    }

    pub fn set_retention_days(&self, days: i64) {
        self.retention_days.store(days, Ordering::Relaxed);
    }

    /// Restores the persisted record. Anything unreadable means `Unknown`.
    pub async fn load_consent(&self) -> ConsentStatus {
        let mut record = self.record.lock().await;
        let loaded = match self.storage.read(CONSENT_STORAGE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<ConsentRecord>(&raw) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "persisted consent unreadable, treating as unknown");
                    ConsentRecord::unknown()
                }
            },
            Ok(None) => ConsentRecord::unknown(),
            Err(e) => {
                warn!(error = %e, "consent load failed, treating as unknown");
                ConsentRecord::unknown()
            }
        };
        *record = loaded;
        self.expire_locked(&mut record).await;
        debug!(status = ?record.status, "consent loaded");
        record.status
    }

    pub async fn status(&self) -> ConsentStatus {
        let mut record = self.record.lock().await;
        self.expire_locked(&mut record).await;
        record.status
    }

    pub async fn is_granted(&self) -> bool {
        self.status().await == ConsentStatus::Granted
    }

    /// Returns the current status, prompting the user when it is still unknown or when
    /// `force` is set.
    ///
    /// The record is not locked while the user answers. An answer is dropped if the status
    /// changed in the meantime, e.g. a revocation during the prompt.
    pub async fn get_consent(&self, force: bool) -> ConsentStatus {
        let _prompting = self.prompting.lock().await;
        let asked_from = {
            let mut record = self.record.lock().await;
            self.expire_locked(&mut record).await;
            if !force && record.status != ConsentStatus::Unknown {
                return record.status;
            }
            record.status
        };

        let next = match self.prompt.request_consent().await {
            Ok(ConsentStatus::Granted) => ConsentRecord {
                status: ConsentStatus::Granted,
                granted_at: Some(Utc::now()),
            },
            Ok(ConsentStatus::Denied) => ConsentRecord {
                status: ConsentStatus::Denied,
                granted_at: None,
            },
            // The prompt can only grant or deny; anything else leaves the record alone.
            Ok(ConsentStatus::Unknown | ConsentStatus::Revoked) => return self.status().await,
            Err(e) => {
                warn!(error = %e, "consent prompt failed");
                return self.status().await;
            }
        };

        let mut record = self.record.lock().await;
        self.expire_locked(&mut record).await;
        if record.status != asked_from {
            debug!(asked_from = ?asked_from, now = ?record.status, "consent changed during prompt, answer dropped");
            return record.status;
        }
        self.transition_locked(&mut record, next).await;
        record.status
    }

    /// Withdraws consent. Returns the status it replaced.
    pub async fn revoke_consent(&self) -> ConsentStatus {
        let mut record = self.record.lock().await;
        let previous = record.status;
        let next = ConsentRecord {
            status: ConsentStatus::Revoked,
            granted_at: None,
        };
        self.transition_locked(&mut record, next).await;
        info!(from = ?previous, "metrics consent revoked");
        previous
    }

    async fn expire_locked(&self, record: &mut ConsentRecord) {
        let retention = self.retention_days.load(Ordering::Relaxed);
        if record.is_expired(retention, Utc::now()) {
            info!(retention_days = retention, "consent grant expired");
            self.transition_locked(record, ConsentRecord::unknown()).await;
        }
    }

    async fn transition_locked(&self, record: &mut ConsentRecord, next: ConsentRecord) {
        let from = record.status;
        *record = next;
        if from != record.status {
            self.telemetry.record(MonitorEvent::ConsentChanged {
                from,
                to: record.status,
            });
        }

        let persisted = if record.status == ConsentStatus::Unknown {
            self.storage.delete(CONSENT_STORAGE_KEY).await
        } else {
            match serde_json::to_string(&*record) {
                Ok(raw) => self.storage.write(CONSENT_STORAGE_KEY, &raw).await,
                Err(e) => Err(e.into()),
            }
        };
        if let Err(e) = persisted {
            warn!(error = %e, "failed to persist consent, keeping in-memory state");
        }
    }
}
