use std::sync::Arc;
use std::time::Duration;

use playback_monitor::services::simulated::{self, SimulatedDevice};
use playback_monitor::AudioQualityMonitor;
use serde_json::{json, Map, Value};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let audio_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "nudges/morning_walk.mp3".to_string());
    let battery = std::env::args()
        .nth(2)
        .and_then(|raw| raw.parse::<f64>().ok())
        .unwrap_or(80.0);

    tracing::info!(%audio_path, battery, "starting playback monitor demo");

    let remote: Map<String, Value> = json!({
        "debug_sampling_interval_ms": 500,
        "upload_batch_size": 3,
        "security_tier": "enhanced",
    })
    .as_object()
    .cloned()
    .unwrap_or_default();

    let device = Arc::new(SimulatedDevice::new(battery));
    let monitor = AudioQualityMonitor::initialize(
        simulated::collaborators(Arc::clone(&device), remote),
        Some("demo-user".to_string()),
    )
    .await;

    let consent = monitor.get_consent(false).await;
    tracing::info!(?consent, "consent resolved");

    let playable = monitor
        .prepare_audio(&audio_path, "/tmp/playback-monitor-processed.mp3")
        .await?;
    tracing::info!(path = %playable.display(), "audio prepared");

    let mut context = playback_monitor::monitor::types::SessionContext::new();
    context.insert("nudge_id".to_string(), json!("walk-42"));
    context.insert("time_of_day".to_string(), json!("morning"));
    context.insert("email".to_string(), json!("someone@example.com"));

    let handle = monitor.start_session(&playable, None, Some(context)).await?;
    tracing::info!(session_id = %handle.id, state = ?handle.state, "session started");

    // Drop the network halfway through so retries show up in the log.
    tokio::time::sleep(Duration::from_secs(2)).await;
    device.set_online(false);
    tokio::time::sleep(Duration::from_secs(2)).await;
    device.set_online(true);
    tokio::time::sleep(Duration::from_secs(1)).await;

    let final_sample = monitor.stop_session(&handle.id, 100.0, Some(0.85)).await?;
    if let Some(sample) = &final_sample {
        tracing::info!(
            rms_db = sample.rms_db,
            clipping = sample.clipping_percentage,
            "final sample recorded"
        );
    }

    monitor.flush_uploads();
    tokio::time::sleep(Duration::from_millis(200)).await;

    tracing::info!(settings = ?device.settings(), "accessibility settings after run");
    println!("{}", serde_json::to_string_pretty(&monitor.telemetry())?);

    monitor.dispose().await;
    Ok(())
}
