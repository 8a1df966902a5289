use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::types::{AccessibilityAudio, QualityIssue, SettingsUpdate};
use crate::services::AccessibilitySettings;
use crate::telemetry::event::MonitorEvent;
use crate::telemetry::recorder::TelemetryRecorder;

const VOLUME_DOWN: f64 = 0.8;
const VOLUME_UP: f64 = 1.25;
const VOLUME_FLOOR: f64 = 0.1;
const VOLUME_CAP: f64 = 1.0;

/// Turns detected issues into accessibility-setting adjustments.
///
/// Best effort: failures are logged and swallowed so the sampling loop never stops on them.
pub struct AutoCorrector {
    settings: Arc<dyn AccessibilitySettings>,
    telemetry: Arc<TelemetryRecorder>,
}

impl AutoCorrector {
    pub fn new(settings: Arc<dyn AccessibilitySettings>, telemetry: Arc<TelemetryRecorder>) -> Self {
        Self { settings, telemetry }
    }

    /// Applies corrections for `issues`. Returns the update that was sent, if any.
    pub async fn apply(
        &self,
        issues: &BTreeSet<QualityIssue>,
        battery_level: f64,
        low_battery_threshold: f64,
        correlation_id: &str,
    ) -> Option<SettingsUpdate> {
        if issues.is_empty() {
            return None;
        }

        let current = match self.settings.current_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(correlation_id, error = %e, "cannot read accessibility settings, skipping correction");
                self.telemetry.record(MonitorEvent::CorrectionFailed);
                return None;
            }
        };

        let update = plan_correction(issues, &current, battery_level, low_battery_threshold);
        if update.is_empty() {
            debug!(correlation_id, ?issues, "settings already corrected");
            return None;
        }

        match self.settings.update_settings(update).await {
            Ok(()) => {
                debug!(correlation_id, ?update, "accessibility settings adjusted");
                self.telemetry.record(MonitorEvent::CorrectionApplied);
                Some(update)
            }
            Err(e) => {
                warn!(correlation_id, error = %e, "accessibility update failed");
                self.telemetry.record(MonitorEvent::CorrectionFailed);
                None
            }
        }
    }
}

/// Computes the minimal update for `issues` given the current settings. Toggles that are
/// already in the target state are left out, so replaying the same issues is a no-op for them.
pub fn plan_correction(
    issues: &BTreeSet<QualityIssue>,
    current: &AccessibilityAudio,
    battery_level: f64,
    low_battery_threshold: f64,
) -> SettingsUpdate {
    let mut update = SettingsUpdate::default();

    // Turning down wins over turning up: clipping and low volume can co-occur on a noisy file.
    if issues.contains(&QualityIssue::Clipping) || issues.contains(&QualityIssue::HighVolume) {
        let target = (current.volume * VOLUME_DOWN).max(VOLUME_FLOOR);
        if target != current.volume {
            update.volume = Some(target);
        }
    } else if issues.contains(&QualityIssue::LowVolume) {
        let target = (current.volume * VOLUME_UP).min(VOLUME_CAP);
        if target != current.volume {
            update.volume = Some(target);
        }
    }

    if issues.contains(&QualityIssue::BackgroundNoise) && !current.frequency_adjustment {
        update.frequency_adjustment = Some(true);
    }

    if issues.contains(&QualityIssue::PerformanceIssues)
        && current.frequency_adjustment
        && current.volume_normalization
    {
        update.frequency_adjustment = Some(false);
    }

    if issues.contains(&QualityIssue::BatteryDrain) && battery_level <= low_battery_threshold {
        if current.frequency_adjustment {
            update.frequency_adjustment = Some(false);
        } else {
            // Battery safety overrides a noise-driven enable.
            update.frequency_adjustment = None;
        }
        if current.volume_normalization {
            update.volume_normalization = Some(false);
        }
    }

    update
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(volume: f64, freq: bool, norm: bool) -> AccessibilityAudio {
        AccessibilityAudio {
            volume,
            frequency_adjustment: freq,
            volume_normalization: norm,
        }
    }

    fn set(issues: &[QualityIssue]) -> BTreeSet<QualityIssue> {
        issues.iter().copied().collect()
    }

    #[test]
    fn clipping_scales_volume_down_with_floor() {
        let up = plan_correction(&set(&[QualityIssue::Clipping]), &settings(0.5, false, false), 80.0, 30.0);
        assert_eq!(up.volume, Some(0.4));

        let floor = plan_correction(&set(&[QualityIssue::HighVolume]), &settings(0.11, false, false), 80.0, 30.0);
        assert_eq!(floor.volume, Some(0.1));

        let at_floor = plan_correction(&set(&[QualityIssue::HighVolume]), &settings(0.1, false, false), 80.0, 30.0);
        assert!(at_floor.is_empty());
    }

    #[test]
    fn low_volume_scales_up_with_cap() {
        let update = plan_correction(&set(&[QualityIssue::LowVolume]), &settings(0.9, false, false), 80.0, 30.0);
        assert_eq!(update.volume, Some(1.0));
        let capped = plan_correction(&set(&[QualityIssue::LowVolume]), &settings(1.0, false, false), 80.0, 30.0);
        assert!(capped.is_empty());
    }

    #[test]
    fn frequency_toggles_are_idempotent() {
        let noise = set(&[QualityIssue::BackgroundNoise]);
        assert_eq!(
            plan_correction(&noise, &settings(0.5, false, true), 80.0, 30.0).frequency_adjustment,
            Some(true)
        );
        assert!(plan_correction(&noise, &settings(0.5, true, true), 80.0, 30.0).is_empty());

        let perf = set(&[QualityIssue::PerformanceIssues]);
        assert_eq!(
            plan_correction(&perf, &settings(0.5, true, true), 80.0, 30.0).frequency_adjustment,
            Some(false)
        );
        assert!(plan_correction(&perf, &settings(0.5, true, false), 80.0, 30.0).is_empty());
    }

    #[test]
    fn battery_drain_only_acts_on_low_battery() {
        let drain = set(&[QualityIssue::BatteryDrain]);
        assert!(plan_correction(&drain, &settings(0.5, true, true), 80.0, 30.0).is_empty());

        let update = plan_correction(&drain, &settings(0.5, true, true), 25.0, 30.0);
        assert_eq!(update.frequency_adjustment, Some(false));
        assert_eq!(update.volume_normalization, Some(false));
    }
}
