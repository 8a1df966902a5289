use std::future::pending;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use super::cache::MetricsCache;
use crate::config::ConfigurationManager;
use crate::monitor::report::FailureSink;
use crate::monitor::types::QualityMetrics;
use crate::privacy::consent::ConsentManager;
use crate::services::{Connectivity, MetricsRepository};
use crate::telemetry::event::{MonitorEvent, UploadEventKind};
use crate::telemetry::recorder::TelemetryRecorder;

/// `Idle -> Attempting -> Idle` on success, `Attempting -> Scheduled` on failure, and
/// `CoolingDown` once the attempt budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Scheduled { attempt: u32 },
    Attempting,
    CoolingDown,
}

#[derive(Debug)]
enum UploadCommand {
    /// `forced` attempts even while a retry is pending.
    Flush { forced: bool },
    CancelPending,
}

#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
    deadline: Option<Instant>,
    cooling: bool,
}

pub struct UploadDeps {
    pub repository: Arc<dyn MetricsRepository>,
    pub connectivity: Arc<dyn Connectivity>,
    pub consent: Arc<ConsentManager>,
    pub config: Arc<ConfigurationManager>,
    pub telemetry: Arc<TelemetryRecorder>,
    pub failures: FailureSink,
}

/// Front half: the bounded cache behind its own lock. Back half: a single worker task that owns
/// the retry state, so attempts never overlap.
pub struct UploadQueue {
    cache: Mutex<MetricsCache>,
    state: StdMutex<UploadState>,
    commands: mpsc::UnboundedSender<UploadCommand>,
    cancel: CancellationToken,
    deps: UploadDeps,
}

impl UploadQueue {
    /// Builds the queue and spawns its worker. Must be called inside a tokio runtime.
    pub fn spawn(deps: UploadDeps) -> Arc<Self> {
        let capacity = deps.config.current().upload.max_cache_size;
        let online = deps.connectivity.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            cache: Mutex::new(MetricsCache::new(capacity)),
            state: StdMutex::new(UploadState::Idle),
            commands: tx,
            cancel: CancellationToken::new(),
            deps,
        });
        tokio::spawn(Arc::clone(&queue).run(rx, online));
        queue
    }

    /// Current cache generation. Read it before collecting a sample and hand it back to
    /// [`enqueue`](Self::enqueue).
    pub async fn generation(&self) -> u64 {
        self.cache.lock().await.generation()
    }

    /// Caches a finalized sample and triggers an upload once the batch is full or the sample
    /// carries an engagement score. Nothing is triggered without consent.
    ///
    /// Returns `false` and drops the sample when the cache was cleared after `generation` was
    /// read, i.e. consent was revoked while the sample was being collected.
    pub async fn enqueue(&self, metrics: QualityMetrics, generation: u64) -> bool {
        let has_engagement = metrics.engagement_score.is_some();
        let correlation_id = metrics.correlation_id.clone();

        let pushed = {
            let mut cache = self.cache.lock().await;
            cache.push(metrics, generation).map(|evicted| (cache.len(), evicted))
        };
        let Some((len, evicted)) = pushed else {
            debug!(correlation_id = %correlation_id, "cache cleared during collection, sample dropped");
            return false;
        };
        for _ in 0..evicted {
            self.deps.telemetry.record(MonitorEvent::CacheEvicted);
        }
        if evicted > 0 {
            debug!(correlation_id = %correlation_id, evicted, "metrics cache full, dropped oldest");
        }

        let config = self.deps.config.current();
        if len < config.upload.batch_size && !has_engagement {
            return true;
        }
        if !config.features.uploads {
            return true;
        }
        if !self.deps.consent.is_granted().await {
            self.deps
                .telemetry
                .record(MonitorEvent::Upload(UploadEventKind::SkippedNoConsent));
            return true;
        }
        let _ = self.commands.send(UploadCommand::Flush { forced: false });
        true
    }

    /// Asks for an immediate attempt regardless of batch size or pending retries.
    pub fn flush(&self) {
        let _ = self.commands.send(UploadCommand::Flush { forced: true });
    }

    /// Empties the cache, refuses samples collected before this call and drops any pending retry.
    pub async fn clear(&self) -> usize {
        let dropped = {
            let mut cache = self.cache.lock().await;
            let n = cache.len();
            cache.clear();
            n
        };
        let _ = self.commands.send(UploadCommand::CancelPending);
        dropped
    }

    pub async fn resize(&self, capacity: usize) {
        let evicted = self.cache.lock().await.set_capacity(capacity);
        for _ in 0..evicted {
            self.deps.telemetry.record(MonitorEvent::CacheEvicted);
        }
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn cached(&self) -> Vec<QualityMetrics> {
        self.cache.lock().await.iter().cloned().collect()
    }

    pub fn state(&self) -> UploadState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn set_state(&self, next: UploadState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
    }

    async fn run(
        self: Arc<Self>,
        mut commands: mpsc::UnboundedReceiver<UploadCommand>,
        mut online: watch::Receiver<bool>,
    ) {
        let mut retry = RetryState::default();
        let mut watching = true;

        loop {
            let deadline = retry.deadline;
            let wait_for_retry = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("upload worker shutting down");
                    break;
                }
                cmd = commands.recv() => match cmd {
                    Some(UploadCommand::Flush { forced }) => {
                        if forced || retry.deadline.is_none() {
                            self.attempt(&mut retry).await;
                        }
                    }
                    Some(UploadCommand::CancelPending) => {
                        retry = RetryState::default();
                        self.set_state(UploadState::Idle);
                    }
                    None => break,
                },
                _ = wait_for_retry => {
                    retry.deadline = None;
                    if retry.cooling {
                        info!("upload cooldown over, resetting attempt counter");
                        retry = RetryState::default();
                    }
                    self.attempt(&mut retry).await;
                }
                changed = online.changed(), if watching => match changed {
                    Ok(()) => {
                        let is_online = *online.borrow_and_update();
                        if is_online {
                            info!("connectivity regained, retrying upload immediately");
                            retry = RetryState::default();
                            self.attempt(&mut retry).await;
                        }
                    }
                    Err(_) => watching = false,
                },
            }
        }
    }

    async fn attempt(&self, retry: &mut RetryState) {
        let config = self.deps.config.current();
        if !config.features.uploads {
            *retry = RetryState::default();
            self.set_state(UploadState::Idle);
            return;
        }
        if !self.deps.consent.is_granted().await {
            self.deps
                .telemetry
                .record(MonitorEvent::Upload(UploadEventKind::SkippedNoConsent));
            *retry = RetryState::default();
            self.set_state(UploadState::Idle);
            return;
        }

        let Some((last_seq, batch)) = self.cache.lock().await.batch() else {
            *retry = RetryState::default();
            self.set_state(UploadState::Idle);
            return;
        };

        self.set_state(UploadState::Attempting);

        if !self.deps.connectivity.is_connected().await {
            debug!(attempt = retry.attempt + 1, "offline, deferring upload");
            self.deps.telemetry.record(MonitorEvent::Upload(UploadEventKind::Offline {
                attempt: retry.attempt + 1,
            }));
            self.schedule_retry(retry);
            return;
        }

        // Consent may have been revoked while the connectivity probe was in flight.
        if !self.deps.consent.is_granted().await {
            *retry = RetryState::default();
            self.set_state(UploadState::Idle);
            return;
        }

        match self.deps.repository.save_metrics_batch(&batch).await {
            Ok(true) => {
                let removed = self.cache.lock().await.acknowledge(last_seq);
                info!(count = batch.len(), removed, "metrics batch uploaded");
                self.deps.telemetry.record(MonitorEvent::Upload(UploadEventKind::Succeeded {
                    count: batch.len(),
                }));
                *retry = RetryState::default();
                self.set_state(UploadState::Idle);
            }
            Ok(false) => {
                warn!(count = batch.len(), "repository rejected metrics batch");
                self.deps.telemetry.record(MonitorEvent::Upload(UploadEventKind::Failed {
                    attempt: retry.attempt + 1,
                }));
                self.schedule_retry(retry);
            }
            Err(e) => {
                let correlation_id = Uuid::new_v4().to_string();
                self.deps
                    .failures
                    .collaborator_failed("save_metrics_batch", &e, &correlation_id)
                    .await;
                self.deps.telemetry.record(MonitorEvent::Upload(UploadEventKind::Failed {
                    attempt: retry.attempt + 1,
                }));
                self.schedule_retry(retry);
            }
        }
    }

    fn schedule_retry(&self, retry: &mut RetryState) {
        let policy = self.deps.config.current().upload.clone();
        retry.attempt += 1;

        if retry.attempt > policy.max_retry_attempts {
            warn!(
                attempts = retry.attempt - 1,
                cooldown_secs = policy.cooldown.as_secs(),
                "upload retries exhausted, cooling down"
            );
            retry.cooling = true;
            retry.deadline = Some(Instant::now() + policy.cooldown);
            self.deps
                .telemetry
                .record(MonitorEvent::Upload(UploadEventKind::CooldownEntered));
            self.set_state(UploadState::CoolingDown);
            return;
        }

        let delay = BackoffPolicy::from_config(&policy).delay(retry.attempt);
        debug!(attempt = retry.attempt, delay_ms = delay.as_millis() as u64, "upload retry scheduled");
        retry.deadline = Some(Instant::now() + delay);
        self.deps.telemetry.record(MonitorEvent::Upload(UploadEventKind::RetryScheduled {
            attempt: retry.attempt,
            delay_ms: delay.as_millis() as u64,
        }));
        self.set_state(UploadState::Scheduled {
            attempt: retry.attempt,
        });
    }
}
