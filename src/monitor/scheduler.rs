use std::sync::{Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::monitor::MonitorInner;
use super::types::BatteryMode;
use crate::config::{MonitorConfig, CRITICAL_INTERVAL_FACTOR};
use crate::telemetry::event::{MonitorEvent, SchedulerEventKind};

/// Debug override first, then the battery tier.
pub fn interval_for(config: &MonitorConfig, mode: BatteryMode) -> Duration {
    if let Some(debug) = config.debug_sampling_interval {
        return debug;
    }
    match mode {
        BatteryMode::Normal => config.sampling_interval,
        BatteryMode::Reduced => config.low_battery_sampling_interval,
        BatteryMode::Critical => config.sampling_interval * CRITICAL_INTERVAL_FACTOR,
    }
}

struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the single recurring sampling task. The interval is recomputed before every sleep, so
/// battery changes take effect on the next tick.
#[derive(Default)]
pub struct SamplingScheduler {
    handle: Mutex<Option<SchedulerHandle>>,
}

impl SamplingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        let guard = self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.as_ref().is_some_and(|h| !h.task.is_finished())
    }

    /// Starts the loop unless it is already running. Returns whether a new loop was spawned.
    pub(crate) fn start(&self, monitor: Weak<MonitorInner>) -> bool {
        let mut guard = self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.as_ref().is_some_and(|h| !h.task.is_finished()) {
            return false;
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(sampling_loop(monitor, cancel.clone()));
        *guard = Some(SchedulerHandle { cancel, task });
        info!("sampling scheduler started");
        true
    }

    /// Cancels the timer immediately. A tick already in progress runs to completion; the
    /// returned handle lets callers wait for it.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()?;
        handle.cancel.cancel();
        info!("sampling scheduler stopped");
        Some(handle.task)
    }
}

async fn sampling_loop(monitor: Weak<MonitorInner>, cancel: CancellationToken) {
    if let Some(inner) = monitor.upgrade() {
        inner.telemetry.record(MonitorEvent::Scheduler(SchedulerEventKind::Started));
    }

    loop {
        let interval = {
            let Some(inner) = monitor.upgrade() else { break };
            let config = inner.config.current();
            let power = inner
                .collector
                .power(&config.battery, &Uuid::new_v4().to_string())
                .await;
            interval_for(&config, power.mode)
        };
        debug!(interval_ms = interval.as_millis() as u64, "next sampling tick scheduled");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(inner) = monitor.upgrade() else { break };
        inner.run_tick().await;
    }

    if let Some(inner) = monitor.upgrade() {
        inner.telemetry.record(MonitorEvent::Scheduler(SchedulerEventKind::Stopped));
    }
}
