use std::collections::VecDeque;
use std::sync::Mutex;

use super::event::MonitorEvent;
use super::metrics::{compute_snapshot, MonitorTelemetrySnapshot};

const MAX_EVENTS: usize = 10_000;

/// Bounded event ring. The lock is a leaf: it is never held across an await or while another
/// monitor lock is taken.
#[derive(Debug)]
pub struct TelemetryRecorder {
    buffer: Mutex<VecDeque<MonitorEvent>>,
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(256)),
        }
    }

    pub fn record(&self, event: MonitorEvent) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if buffer.len() >= MAX_EVENTS {
            buffer.pop_front();
        }
        buffer.push_back(event);
    }

    pub fn snapshot(&self) -> MonitorTelemetrySnapshot {
        let buffer = self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        compute_snapshot(&buffer)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}
