use std::collections::BTreeSet;

use super::types::{BatteryMode, QualityIssue, QualityMetrics};
use crate::config::QualityThresholds;

/// Issues that stay actionable while the battery is low: hearing safety and battery safety.
pub const REDUCED_MODE_ACTIONABLE: [QualityIssue; 3] = [
    QualityIssue::Clipping,
    QualityIssue::HighVolume,
    QualityIssue::BatteryDrain,
];

/// Pure threshold evaluation over one metrics snapshot.
pub struct IssueDetector {
    thresholds: QualityThresholds,
}

impl IssueDetector {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    /// All comparisons are strict: a value sitting exactly on a threshold is not an issue.
    pub fn detect(&self, m: &QualityMetrics) -> BTreeSet<QualityIssue> {
        let t = &self.thresholds;
        let mut issues = BTreeSet::new();

        if m.clipping_percentage > t.clipping_percentage {
            issues.insert(QualityIssue::Clipping);
        }
        if m.rms_db < t.low_volume_db {
            issues.insert(QualityIssue::LowVolume);
        } else if m.rms_db > t.high_volume_db {
            issues.insert(QualityIssue::HighVolume);
        }
        if m.snr_db.is_some_and(|snr| snr < t.min_snr_db) {
            issues.insert(QualityIssue::BackgroundNoise);
        }
        if m.cpu_percentage > t.cpu_percentage {
            issues.insert(QualityIssue::PerformanceIssues);
        }
        if m.battery_drain_rate.is_some_and(|drain| drain > t.battery_drain_per_min) {
            issues.insert(QualityIssue::BatteryDrain);
        }
        if m.engagement_score.is_some_and(|e| e < t.low_engagement) {
            issues.insert(QualityIssue::LowEngagement);
        }

        issues
    }

    /// Subset of `issues` the corrector may act on under `mode`. The rest are still recorded.
    pub fn actionable(issues: &BTreeSet<QualityIssue>, mode: BatteryMode) -> BTreeSet<QualityIssue> {
        if !mode.is_reduced() {
            return issues.clone();
        }
        issues
            .iter()
            .copied()
            .filter(|issue| REDUCED_MODE_ACTIONABLE.contains(issue))
            .collect()
    }
}
