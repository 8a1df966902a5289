use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::event::{MonitorEvent, SchedulerEventKind, UploadEventKind};
use crate::monitor::types::QualityIssue;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorTelemetrySnapshot {
    pub session_stats: SessionStats,
    pub issue_stats: IssueStats,
    pub upload_stats: UploadStats,
    pub consent_changes: u64,
    pub collaborator_failures: BTreeMap<String, u64>,
    pub ticks: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub started: u64,
    pub degraded: u64,
    pub stopped: u64,
    pub samples: u64,
    pub discarded_samples: u64,
    pub avg_samples_per_session: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueStats {
    pub detected: BTreeMap<QualityIssue, u64>,
    pub recorded_only: u64,
    pub corrections_applied: u64,
    pub corrections_failed: u64,
    pub anonymized: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadStats {
    pub batches_uploaded: u64,
    pub metrics_uploaded: u64,
    pub failures: u64,
    pub offline_attempts: u64,
    pub retries_scheduled: u64,
    pub max_retry_delay_ms: u64,
    pub cooldowns: u64,
    pub skipped_no_consent: u64,
    pub cache_evictions: u64,
}

pub fn compute_snapshot(events: &VecDeque<MonitorEvent>) -> MonitorTelemetrySnapshot {
    let mut snap = MonitorTelemetrySnapshot::default();
    let mut samples_at_stop = 0u64;

    for event in events {
        match event {
            MonitorEvent::SessionStarted { degraded } => {
                snap.session_stats.started += 1;
                if degraded.is_some() {
                    snap.session_stats.degraded += 1;
                }
            }
            MonitorEvent::SessionStopped { samples } => {
                snap.session_stats.stopped += 1;
                samples_at_stop += samples;
            }
            MonitorEvent::SampleCollected { .. } => snap.session_stats.samples += 1,
            MonitorEvent::SampleDiscarded => snap.session_stats.discarded_samples += 1,
            MonitorEvent::IssueDetected { issue, acted_upon } => {
                *snap.issue_stats.detected.entry(*issue).or_insert(0) += 1;
                if !acted_upon {
                    snap.issue_stats.recorded_only += 1;
                }
            }
            MonitorEvent::CorrectionApplied => snap.issue_stats.corrections_applied += 1,
            MonitorEvent::CorrectionFailed => snap.issue_stats.corrections_failed += 1,
            MonitorEvent::ComplianceAnonymized { .. } => snap.issue_stats.anonymized += 1,
            MonitorEvent::CacheEvicted => snap.upload_stats.cache_evictions += 1,
            MonitorEvent::Upload(kind) => match kind {
                UploadEventKind::Succeeded { count } => {
                    snap.upload_stats.batches_uploaded += 1;
                    snap.upload_stats.metrics_uploaded += *count as u64;
                }
                UploadEventKind::Failed { .. } => snap.upload_stats.failures += 1,
                UploadEventKind::Offline { .. } => snap.upload_stats.offline_attempts += 1,
                UploadEventKind::RetryScheduled { delay_ms, .. } => {
                    snap.upload_stats.retries_scheduled += 1;
                    snap.upload_stats.max_retry_delay_ms =
                        snap.upload_stats.max_retry_delay_ms.max(*delay_ms);
                }
                UploadEventKind::CooldownEntered => snap.upload_stats.cooldowns += 1,
                UploadEventKind::SkippedNoConsent => snap.upload_stats.skipped_no_consent += 1,
            },
            MonitorEvent::ConsentChanged { .. } => snap.consent_changes += 1,
            MonitorEvent::CollaboratorFailure { component } => {
                *snap.collaborator_failures.entry(component.to_string()).or_insert(0) += 1;
            }
            MonitorEvent::Scheduler(SchedulerEventKind::Tick { .. }) => snap.ticks += 1,
            MonitorEvent::Scheduler(_) => {}
        }
    }

    if snap.session_stats.stopped > 0 {
        snap.session_stats.avg_samples_per_session =
            samples_at_stop as f64 / snap.session_stats.stopped as f64;
    }

    snap
}
