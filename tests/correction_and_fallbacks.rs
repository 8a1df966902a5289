mod common;

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use serde_json::json;

use common::{manual_config, monitor, FakePlatform};
use playback_monitor::monitor::types::{AudioAnalysis, QualityIssue};

fn clipping() -> AudioAnalysis {
    AudioAnalysis {
        peak_amplitude: 1.0,
        rms_db: -12.0,
        clipping_percentage: 4.0,
        snr_db: Some(30.0),
    }
}

#[tokio::test]
async fn clipping_turns_the_volume_down() {
    let platform = FakePlatform::new();
    platform.set_remote(manual_config());
    platform.set_analysis(clipping());
    let monitor = monitor(&platform).await;
    monitor.start_session("loud.mp3", None, None).await.unwrap();

    assert_eq!(monitor.run_tick().await, 1);

    let updates = platform.settings_updates();
    assert_eq!(updates.len(), 1);
    let volume = updates[0].volume.expect("volume adjusted");
    assert!((volume - 0.4).abs() < 1e-9);

    let telemetry = monitor.telemetry();
    assert_eq!(telemetry.issue_stats.detected.get(&QualityIssue::Clipping), Some(&1));
    assert_eq!(telemetry.issue_stats.corrections_applied, 1);
    assert_eq!(telemetry.issue_stats.recorded_only, 0);
}

#[tokio::test]
async fn quiet_audio_turns_the_volume_up_to_the_cap() {
    let platform = FakePlatform::new();
    platform.set_remote(manual_config());
    platform.set_analysis(AudioAnalysis {
        peak_amplitude: 0.1,
        rms_db: -42.0,
        clipping_percentage: 0.0,
        snr_db: Some(30.0),
    });
    platform.settings.lock().unwrap().volume = 0.9;
    let monitor = monitor(&platform).await;
    monitor.start_session("quiet.mp3", None, None).await.unwrap();

    monitor.run_tick().await;

    assert_eq!(platform.settings_updates()[0].volume, Some(1.0));
}

#[tokio::test]
async fn low_battery_limits_corrections_to_safety_issues() {
    let platform = FakePlatform::new();
    platform.set_remote(manual_config());
    platform.set_battery(25.0, false);
    platform.set_analysis(AudioAnalysis {
        peak_amplitude: 0.1,
        rms_db: -42.0,
        clipping_percentage: 0.0,
        snr_db: None,
    });
    let monitor = monitor(&platform).await;
    monitor.start_session("quiet.mp3", None, None).await.unwrap();

    monitor.run_tick().await;

    assert!(platform.settings_updates().is_empty());
    assert_eq!(platform.simple_analyze_calls.load(Ordering::SeqCst), 1);
    assert_eq!(platform.analyze_calls.load(Ordering::SeqCst), 0);
    let telemetry = monitor.telemetry();
    assert_eq!(telemetry.issue_stats.detected.get(&QualityIssue::LowVolume), Some(&1));
    assert_eq!(telemetry.issue_stats.recorded_only, 1);
}

#[tokio::test]
async fn correction_toggle_disables_adjustments() {
    let platform = FakePlatform::new();
    let mut remote = manual_config();
    remote["enable_auto_correction"] = json!(false);
    platform.set_remote(remote);
    platform.set_analysis(clipping());
    let monitor = monitor(&platform).await;
    monitor.start_session("loud.mp3", None, None).await.unwrap();

    monitor.run_tick().await;

    assert!(platform.settings_updates().is_empty());
    assert_eq!(monitor.telemetry().issue_stats.recorded_only, 1);
}

#[tokio::test]
async fn final_sample_issues_are_recorded_not_corrected() {
    let platform = FakePlatform::new();
    platform.set_remote(manual_config());
    platform.set_analysis(clipping());
    let monitor = monitor(&platform).await;
    let handle = monitor.start_session("loud.mp3", None, None).await.unwrap();

    monitor.stop_session(&handle.id, 100.0, Some(0.1)).await.unwrap();

    assert!(platform.settings_updates().is_empty());
    let detected = monitor.telemetry().issue_stats.detected;
    assert_eq!(detected.get(&QualityIssue::Clipping), Some(&1));
    assert_eq!(detected.get(&QualityIssue::LowEngagement), Some(&1));
}

#[tokio::test]
async fn analyzer_failure_falls_back_without_leaking_details() {
    let platform = FakePlatform::new();
    platform.set_remote(manual_config());
    platform.analyzer_fails.store(true, Ordering::SeqCst);
    let monitor = monitor(&platform).await;
    let handle = monitor.start_session("private.mp3", None, None).await.unwrap();
    assert!(handle.is_monitored());

    assert_eq!(monitor.run_tick().await, 1);
    let metrics = monitor.cached_metrics().await.pop().unwrap();
    assert_eq!(metrics.peak_amplitude, 0.0);
    assert_eq!(metrics.rms_db, -60.0);
    assert_eq!(metrics.snr_db, None);
    assert_eq!(metrics.format.codec, "unknown");

    let failures = monitor.telemetry().collaborator_failures;
    assert_eq!(failures.get("audio_analysis"), Some(&1));
    assert_eq!(failures.get("format_info"), Some(&1));

    let reports = platform.reports();
    assert!(!reports.is_empty());
    for (_, message, context) in reports {
        assert!(!message.contains("private.mp3"));
        assert!(context.values().all(|v| !v.contains("private.mp3")));
    }
}

#[tokio::test]
async fn battery_probe_failure_assumes_full_power() {
    let platform = FakePlatform::new();
    platform.set_remote(manual_config());
    platform.battery_fails.store(true, Ordering::SeqCst);
    let monitor = monitor(&platform).await;

    let handle = monitor.start_session("nudge.mp3", None, None).await.unwrap();

    assert!(handle.is_monitored());
    assert_eq!(monitor.run_tick().await, 1);
    assert_eq!(platform.analyze_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn prepare_audio_prefers_elderly_processing() {
    let platform = FakePlatform::new();
    platform.set_remote(manual_config());
    let monitor = monitor(&platform).await;

    let path = monitor.prepare_audio("in.mp3", "out.mp3").await.unwrap();
    assert_eq!(path, PathBuf::from("out.mp3"));
}

#[tokio::test]
async fn prepare_audio_falls_back_to_the_original() {
    let platform = FakePlatform::new();
    platform.set_remote(manual_config());
    let monitor = monitor(&platform).await;

    platform.elderly_ok.store(false, Ordering::SeqCst);
    assert_eq!(
        monitor.prepare_audio("in.mp3", "out.mp3").await.unwrap(),
        PathBuf::from("out.mp3")
    );

    platform.processing_fails.store(true, Ordering::SeqCst);
    assert_eq!(
        monitor.prepare_audio("in.mp3", "out.mp3").await.unwrap(),
        PathBuf::from("in.mp3")
    );

    let err = monitor.prepare_audio("", "out.mp3").await.unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn prepare_audio_skips_elderly_pipeline_on_low_battery() {
    let platform = FakePlatform::new();
    platform.set_remote(manual_config());
    platform.set_battery(20.0, false);
    platform.simple_ok.store(false, Ordering::SeqCst);
    let monitor = monitor(&platform).await;

    // Elderly processing would succeed, but is not attempted.
    let path = monitor.prepare_audio("in.mp3", "out.mp3").await.unwrap();
    assert_eq!(path, PathBuf::from("in.mp3"));
}
