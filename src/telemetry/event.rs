use serde::{Deserialize, Serialize};

use crate::monitor::types::{DegradedReason, QualityIssue};
use crate::privacy::consent::ConsentStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MonitorEvent {
    SessionStarted {
        degraded: Option<DegradedReason>,
    },

    SessionStopped {
        samples: u64,
    },

    SampleCollected {
        issues: usize,
    },

    SampleDiscarded,

    IssueDetected {
        issue: QualityIssue,
        acted_upon: bool,
    },

    CorrectionApplied,

    CorrectionFailed,

    ComplianceAnonymized {
        violations: usize,
    },

    CacheEvicted,

    Upload(UploadEventKind),

    ConsentChanged {
        from: ConsentStatus,
        to: ConsentStatus,
    },

    CollaboratorFailure {
        component: &'static str,
    },

    Scheduler(SchedulerEventKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadEventKind {
    Succeeded { count: usize },
    Failed { attempt: u32 },
    Offline { attempt: u32 },
    RetryScheduled { attempt: u32, delay_ms: u64 },
    CooldownEntered,
    SkippedNoConsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerEventKind {
    Started,
    Stopped,
    Tick { sessions: usize },
}
