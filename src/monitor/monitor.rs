use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::collector::{elapsed_completion, MetricsCollector};
use super::corrector::AutoCorrector;
use super::detector::IssueDetector;
use super::registry::{SessionEntry, SessionRegistry};
use super::report::FailureSink;
use super::scheduler::SamplingScheduler;
use super::types::{
    BatteryMode, DegradedReason, MetricsFilter, MonitoringState, PlaybackSession, QualityMetrics,
    SessionContext, SessionHandle,
};
use crate::config::{ConfigurationManager, MonitorConfig};
use crate::error::{MonitorError, Result};
use crate::privacy::consent::{ConsentManager, ConsentStatus};
use crate::privacy::sanitize::{hash_identifier, sanitize_context};
use crate::privacy::security::SecurityModule;
use crate::services::Collaborators;
use crate::telemetry::event::{MonitorEvent, SchedulerEventKind};
use crate::telemetry::{MonitorTelemetrySnapshot, TelemetryRecorder};
use crate::upload::queue::{UploadDeps, UploadQueue, UploadState};

/// Context keys lifted out of the free-form context into the session's nudge id.
const NUDGE_ID_KEYS: [&str; 2] = ["nudge_id", "nudgeId"];

/// Session-scoped audio quality monitor.
///
/// Cheap to clone; every clone drives the same sessions, scheduler and upload queue. Construct
/// one per app with [`AudioQualityMonitor::initialize`] and call [`dispose`](Self::dispose) on
/// shutdown.
#[derive(Clone)]
pub struct AudioQualityMonitor {
    inner: Arc<MonitorInner>,
}

pub(crate) struct MonitorInner {
    collaborators: Collaborators,
    pub(crate) config: Arc<ConfigurationManager>,
    consent: Arc<ConsentManager>,
    security: RwLock<Arc<SecurityModule>>,
    registry: SessionRegistry,
    scheduler: SamplingScheduler,
    pub(crate) collector: MetricsCollector,
    corrector: AutoCorrector,
    uploads: Arc<UploadQueue>,
    pub(crate) telemetry: Arc<TelemetryRecorder>,
    failures: FailureSink,
    user_id: Option<String>,
}

impl AudioQualityMonitor {
    /// Loads configuration and consent, prepares the encryption key and starts the upload
    /// worker. Never fails: every collaborator problem degrades to a documented default.
    pub async fn initialize(collaborators: Collaborators, user_id: Option<String>) -> Self {
        let telemetry = Arc::new(TelemetryRecorder::new());

        let config = Arc::new(ConfigurationManager::new(Arc::clone(&collaborators.remote_config)));
        let current = config.load().await;

        let consent = Arc::new(ConsentManager::new(
            Arc::clone(&collaborators.secure_storage),
            Arc::clone(&collaborators.consent_prompt),
            Arc::clone(&telemetry),
            current.consent_retention_days,
        ));
        let status = consent.load_consent().await;

        let security = SecurityModule::initialize(
            current.security_tier,
            collaborators.secure_storage.as_ref(),
            Arc::clone(&telemetry),
        )
        .await;

        let failures = FailureSink::new(Arc::clone(&collaborators.error_reporter), Arc::clone(&telemetry));
        let collector = MetricsCollector::new(
            Arc::clone(&collaborators.analyzer),
            Arc::clone(&collaborators.performance),
            failures.clone(),
        );
        let corrector = AutoCorrector::new(Arc::clone(&collaborators.accessibility), Arc::clone(&telemetry));
        let uploads = UploadQueue::spawn(UploadDeps {
            repository: Arc::clone(&collaborators.repository),
            connectivity: Arc::clone(&collaborators.connectivity),
            consent: Arc::clone(&consent),
            config: Arc::clone(&config),
            telemetry: Arc::clone(&telemetry),
            failures: failures.clone(),
        });

        info!(consent = ?status, tier = ?current.security_tier, "audio quality monitor initialized");

        Self {
            inner: Arc::new(MonitorInner {
                collaborators,
                config,
                consent,
                security: RwLock::new(Arc::new(security)),
                registry: SessionRegistry::new(),
                scheduler: SamplingScheduler::new(),
                collector,
                corrector,
                uploads,
                telemetry,
                failures,
                user_id,
            }),
        }
    }

    /// Registers a playback session.
    ///
    /// Critical battery or missing consent still yield a session id, but the handle is marked
    /// degraded and the session is never sampled.
    pub async fn start_session(
        &self,
        path: impl AsRef<Path>,
        session_id: Option<String>,
        context: Option<SessionContext>,
    ) -> Result<SessionHandle> {
        let inner = &self.inner;
        let path = path.as_ref();
        let correlation_id = Uuid::new_v4().to_string();
        if path.as_os_str().to_string_lossy().trim().is_empty() {
            return inner
                .reject(MonitorError::validation("path cannot be empty"), &correlation_id)
                .await;
        }

        let id = session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let config = inner.config.current();

        // 1. Battery gate
        let power = inner.collector.power(&config.battery, &correlation_id).await;
        let state = if power.mode == BatteryMode::Critical {
            info!(correlation_id = %correlation_id, level = power.level, "critical battery, session not sampled");
            MonitoringState::Degraded(DegradedReason::CriticalBattery)
        } else {
            // 2. Consent gate
            let mut consent = inner.consent.status().await;
            if consent == ConsentStatus::Unknown {
                consent = inner.consent.get_consent(false).await;
            }
            if consent == ConsentStatus::Granted {
                MonitoringState::Active
            } else {
                info!(correlation_id = %correlation_id, ?consent, "no consent, session not sampled");
                MonitoringState::Degraded(DegradedReason::ConsentNotGranted)
            }
        };

        // 3. Build the session
        let session = inner
            .build_session(&id, path, &correlation_id, &config, context, state)
            .await;
        if let Err(e) = inner.registry.insert(SessionEntry::new(session, state)).await {
            return inner.reject(e, &correlation_id).await;
        }

        let degraded = match state {
            MonitoringState::Active => None,
            MonitoringState::Degraded(reason) => Some(reason),
        };
        inner.telemetry.record(MonitorEvent::SessionStarted { degraded });

        if state == MonitoringState::Active {
            inner.scheduler.start(Arc::downgrade(&self.inner));
        }
        debug!(correlation_id = %correlation_id, session_id = %id, ?state, "session registered");

        Ok(SessionHandle { id, state })
    }

    /// Finalizes a session. Returns the final sample, or `None` when the id is unknown, the
    /// session was degraded, or consent is no longer granted. Calling it twice is harmless.
    pub async fn stop_session(
        &self,
        session_id: &str,
        completion_percentage: f64,
        engagement_score: Option<f64>,
    ) -> Result<Option<QualityMetrics>> {
        let inner = &self.inner;
        if !(0.0..=100.0).contains(&completion_percentage) {
            let err = MonitorError::validation("completion must be between 0 and 100");
            return inner.reject(err, &Uuid::new_v4().to_string()).await;
        }
        if let Some(engagement) = engagement_score {
            if !(0.0..=1.0).contains(&engagement) {
                let err = MonitorError::validation("engagement must be between 0 and 1");
                return inner.reject(err, &Uuid::new_v4().to_string()).await;
            }
        }

        let Some(entry) = inner.registry.remove(session_id).await else {
            debug!(session_id, "stop for unknown session ignored");
            return Ok(None);
        };
        if inner.registry.sampling_count().await == 0 {
            let _ = inner.scheduler.stop();
            // A session may have started between the count and the stop.
            if inner.registry.sampling_count().await > 0 {
                inner.scheduler.start(Arc::downgrade(&self.inner));
            }
        }
        inner.telemetry.record(MonitorEvent::SessionStopped {
            samples: entry.samples,
        });

        if !entry.is_sampling() {
            return Ok(None);
        }
        let generation = inner.uploads.generation().await;
        if !inner.consent.is_granted().await {
            return Ok(None);
        }

        let session = entry.session;
        let config = inner.config.current();
        let power = inner.collector.power(&config.battery, &session.correlation_id).await;
        let metrics = inner
            .collector
            .collect(&session, power.mode, &config, completion_percentage, engagement_score)
            .await;
        if !inner.consent.is_granted().await {
            debug!(correlation_id = %session.correlation_id, "consent withdrawn during collection, final sample dropped");
            inner.telemetry.record(MonitorEvent::SampleDiscarded);
            return Ok(None);
        }

        let issues = IssueDetector::new(config.thresholds.clone()).detect(&metrics);
        for issue in issues {
            inner.telemetry.record(MonitorEvent::IssueDetected {
                issue,
                acted_upon: false,
            });
        }

        let metrics = inner.security().enforce(metrics);
        if !inner.uploads.enqueue(metrics.clone(), generation).await {
            inner.telemetry.record(MonitorEvent::SampleDiscarded);
            return Ok(None);
        }
        info!(correlation_id = %session.correlation_id, samples = entry.samples, "session finalized");
        Ok(Some(metrics))
    }

    /// Runs one sampling pass over all active sessions. Returns how many samples were stored.
    pub async fn run_tick(&self) -> usize {
        self.inner.run_tick().await
    }

    pub async fn session_status(&self, session_id: &str) -> Option<MonitoringState> {
        self.inner.registry.status(session_id).await
    }

    pub async fn session_sample_count(&self, session_id: &str) -> Option<u64> {
        self.inner.registry.sample_count(session_id).await
    }

    pub async fn active_session_count(&self) -> usize {
        self.inner.registry.sampling_count().await
    }

    pub fn is_sampling(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    pub async fn get_consent(&self, force: bool) -> ConsentStatus {
        self.inner.consent.get_consent(force).await
    }

    pub async fn consent_status(&self) -> ConsentStatus {
        self.inner.consent.status().await
    }

    /// Withdraws consent, empties the upload cache and asks the remote store to forget the user.
    pub async fn revoke_consent(&self) -> ConsentStatus {
        let inner = &self.inner;
        let correlation_id = Uuid::new_v4().to_string();

        let previous = inner.consent.revoke_consent().await;
        let dropped = inner.uploads.clear().await;
        info!(correlation_id = %correlation_id, dropped, "cached metrics discarded after revocation");

        let identity = match &inner.user_id {
            Some(user) => Some(user.clone()),
            None => match inner.collaborators.device.device_id().await {
                Ok(id) => Some(id),
                Err(e) => {
                    inner.failures.collaborator_failed("device_id", &e, &correlation_id).await;
                    None
                }
            },
        };
        if let Some(identity) = identity {
            if let Err(e) = inner.collaborators.repository.clear_metrics(&identity).await {
                inner.failures.collaborator_failed("clear_metrics", &e, &correlation_id).await;
            }
        }
        previous
    }

    pub fn configuration(&self) -> Arc<MonitorConfig> {
        self.inner.config.current()
    }

    /// Swaps the configuration. The scheduler is stopped (waiting for an in-flight tick), the new
    /// values are installed, and sampling restarts if sessions are active.
    pub async fn update_configuration(&self, config: MonitorConfig) {
        let inner = &self.inner;
        if let Some(running) = inner.scheduler.stop() {
            let _ = running.await;
        }

        let previous_tier = inner.config.current().security_tier;
        let config = inner.config.replace(config);
        inner.consent.set_retention_days(config.consent_retention_days);
        inner.uploads.resize(config.upload.max_cache_size).await;

        if config.security_tier != previous_tier {
            let security = SecurityModule::initialize(
                config.security_tier,
                inner.collaborators.secure_storage.as_ref(),
                Arc::clone(&inner.telemetry),
            )
            .await;
            *inner.security.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(security);
        }

        if inner.registry.sampling_count().await > 0 {
            inner.scheduler.start(Arc::downgrade(&self.inner));
        }
        info!("monitor configuration updated");
    }

    /// Runs the playback pre-processing pipeline and returns the file to play. Elderly-tuned
    /// processing is used on normal power, the simple pipeline otherwise or as a fallback, and
    /// the unprocessed input if both fail.
    pub async fn prepare_audio(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<PathBuf> {
        let inner = &self.inner;
        let (input, output) = (input.as_ref(), output.as_ref());
        let correlation_id = Uuid::new_v4().to_string();
        if input.as_os_str().is_empty() || output.as_os_str().is_empty() {
            return inner
                .reject(MonitorError::validation("path cannot be empty"), &correlation_id)
                .await;
        }
        let config = inner.config.current();
        let power = inner.collector.power(&config.battery, &correlation_id).await;
        let analyzer = &inner.collaborators.analyzer;

        if power.mode == BatteryMode::Normal {
            match analyzer.process_for_elderly(input, output).await {
                Ok(true) => return Ok(output.to_path_buf()),
                Ok(false) => debug!(correlation_id = %correlation_id, "elderly processing declined"),
                Err(e) => inner.failures.collaborator_failed("process_for_elderly", &e, &correlation_id).await,
            }
        }

        match analyzer.process_simple(input, output).await {
            Ok(true) => Ok(output.to_path_buf()),
            Ok(false) => {
                warn!(correlation_id = %correlation_id, "audio processing unavailable, playing original");
                Ok(input.to_path_buf())
            }
            Err(e) => {
                inner.failures.collaborator_failed("process_simple", &e, &correlation_id).await;
                Ok(input.to_path_buf())
            }
        }
    }

    /// Reads stored metrics back from the repository. Empty without consent or on failure.
    pub async fn query_metrics(&self, filter: &MetricsFilter) -> Vec<QualityMetrics> {
        let inner = &self.inner;
        if !inner.consent.is_granted().await {
            return Vec::new();
        }
        match inner.collaborators.repository.get_metrics(filter).await {
            Ok(metrics) => metrics,
            Err(e) => {
                let correlation_id = Uuid::new_v4().to_string();
                inner.failures.collaborator_failed("get_metrics", &e, &correlation_id).await;
                Vec::new()
            }
        }
    }

    pub fn flush_uploads(&self) {
        self.inner.uploads.flush();
    }

    pub fn upload_state(&self) -> UploadState {
        self.inner.uploads.state()
    }

    pub async fn cached_metrics(&self) -> Vec<QualityMetrics> {
        self.inner.uploads.cached().await
    }

    pub async fn cached_metrics_len(&self) -> usize {
        self.inner.uploads.cached_len().await
    }

    pub fn telemetry(&self) -> MonitorTelemetrySnapshot {
        self.inner.telemetry.snapshot()
    }

    pub fn decrypt_identifier(&self, token: &str) -> Result<String> {
        self.inner.security().decrypt_identifier(token)
    }

    /// Stops sampling and uploading and forgets every session.
    pub async fn dispose(&self) {
        let _ = self.inner.scheduler.stop();
        self.inner.uploads.shutdown();
        let dropped = self.inner.registry.clear().await;
        info!(sessions = dropped, "audio quality monitor disposed");
    }
}

impl MonitorInner {
    fn security(&self) -> Arc<SecurityModule> {
        Arc::clone(&self.security.read().unwrap_or_else(|p| p.into_inner()))
    }

    async fn reject<T>(&self, err: MonitorError, correlation_id: &str) -> Result<T> {
        self.failures.rejected(&err, correlation_id).await;
        Err(err)
    }

    async fn build_session(
        &self,
        id: &str,
        path: &Path,
        correlation_id: &str,
        config: &MonitorConfig,
        context: Option<SessionContext>,
        state: MonitoringState,
    ) -> PlaybackSession {
        let format = if state == MonitoringState::Active {
            self.collector.format_info(path, correlation_id).await
        } else {
            super::types::FormatInfo::unknown()
        };

        let device_model = match self.collaborators.device.device_model().await {
            Ok(model) => model,
            Err(e) => {
                self.failures.collaborator_failed("device_model", &e, correlation_id).await;
                "unknown".to_string()
            }
        };

        let mut context = context.unwrap_or_default();
        let nudge_id = NUDGE_ID_KEYS
            .iter()
            .find_map(|key| context.remove(*key))
            .and_then(|v| match v {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        let context = if config.features.context_collection {
            sanitize_context(&context)
        } else {
            SessionContext::new()
        };

        let user_id = self.user_id.as_deref().map(|user| {
            if !config.privacy_mode {
                return user.to_string();
            }
            match self.security().encrypt_identifier(user) {
                Ok(token) => token,
                Err(e) => {
                    warn!(correlation_id, error = %e, "user id encryption failed, storing digest");
                    hash_identifier(user)
                }
            }
        });

        PlaybackSession {
            id: id.to_string(),
            audio_path: path.to_path_buf(),
            started_at: Utc::now(),
            format,
            device_model,
            nudge_id,
            user_id,
            correlation_id: correlation_id.to_string(),
            context,
        }
    }

    pub(crate) async fn run_tick(&self) -> usize {
        let sessions = self.registry.sampling_sessions().await;
        if sessions.is_empty() {
            return 0;
        }
        self.telemetry.record(MonitorEvent::Scheduler(SchedulerEventKind::Tick {
            sessions: sessions.len(),
        }));

        // Read before the consent check so a revocation from here on is caught at enqueue.
        let generation = self.uploads.generation().await;
        if !self.consent.is_granted().await {
            debug!(sessions = sessions.len(), "consent not granted, tick skipped");
            return 0;
        }

        let config = self.config.current();
        let tick_id = Uuid::new_v4().to_string();
        let power = self.collector.power(&config.battery, &tick_id).await;
        let detector = IssueDetector::new(config.thresholds.clone());
        let mut stored = 0;

        // Sessions run one after another so a tick never bursts the CPU.
        for (i, session) in sessions.iter().enumerate() {
            if i > 0 && !config.inter_session_delay.is_zero() {
                tokio::time::sleep(config.inter_session_delay).await;
            }

            let completion = elapsed_completion(session, Utc::now());
            let metrics = self
                .collector
                .collect(session, power.mode, &config, completion, None)
                .await;

            if !self.consent.is_granted().await {
                debug!(correlation_id = %session.correlation_id, "consent withdrawn during collection, tick abandoned");
                self.telemetry.record(MonitorEvent::SampleDiscarded);
                break;
            }

            // The session may have been stopped while the collaborators were working.
            if !self.registry.record_sample(&session.id).await {
                debug!(correlation_id = %session.correlation_id, "session gone, sample discarded");
                self.telemetry.record(MonitorEvent::SampleDiscarded);
                continue;
            }

            let issues = detector.detect(&metrics);
            let actionable = IssueDetector::actionable(&issues, power.mode);
            let correcting = config.features.auto_correction;
            for issue in &issues {
                self.telemetry.record(MonitorEvent::IssueDetected {
                    issue: *issue,
                    acted_upon: correcting && actionable.contains(issue),
                });
            }
            if correcting && !actionable.is_empty() {
                self.corrector
                    .apply(
                        &actionable,
                        power.level,
                        config.battery.low_threshold,
                        &session.correlation_id,
                    )
                    .await;
            }
            self.telemetry.record(MonitorEvent::SampleCollected {
                issues: issues.len(),
            });

            let metrics = self.security().enforce(metrics);
            if !self.uploads.enqueue(metrics, generation).await {
                self.telemetry.record(MonitorEvent::SampleDiscarded);
                break;
            }
            stored += 1;
        }

        stored
    }
}
