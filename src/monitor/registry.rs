use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::types::{MonitoringState, PlaybackSession};
use crate::error::{MonitorError, Result};

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub session: Arc<PlaybackSession>,
    pub state: MonitoringState,
    pub samples: u64,
}

impl SessionEntry {
    pub fn new(session: PlaybackSession, state: MonitoringState) -> Self {
        Self {
            session: Arc::new(session),
            state,
            samples: 0,
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.state == MonitoringState::Active
    }
}

/// Active playback sessions, keyed by id. Every method takes the registry lock for the duration
/// of a map operation only; callers never hold it across a collaborator call.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, entry: SessionEntry) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&entry.session.id) {
            return Err(MonitorError::validation(format!(
                "session {} is already active",
                entry.session.id
            )));
        }
        sessions.insert(entry.session.id.clone(), entry);
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Option<SessionEntry> {
        self.sessions.lock().await.remove(id)
    }

    pub async fn status(&self, id: &str) -> Option<MonitoringState> {
        self.sessions.lock().await.get(id).map(|e| e.state)
    }

    pub async fn sample_count(&self, id: &str) -> Option<u64> {
        self.sessions.lock().await.get(id).map(|e| e.samples)
    }

    /// Sessions to sample on the next tick, in start order.
    pub async fn sampling_sessions(&self) -> Vec<Arc<PlaybackSession>> {
        let sessions = self.sessions.lock().await;
        let mut active: Vec<Arc<PlaybackSession>> = sessions
            .values()
            .filter(|e| e.is_sampling())
            .map(|e| Arc::clone(&e.session))
            .collect();
        active.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        active
    }

    pub async fn sampling_count(&self) -> usize {
        self.sessions.lock().await.values().filter(|e| e.is_sampling()).count()
    }

    /// Counts a stored sample. Returns `false` when the session was removed meanwhile, in which
    /// case the sample must be discarded.
    pub async fn record_sample(&self, id: &str) -> bool {
        match self.sessions.lock().await.get_mut(id) {
            Some(entry) => {
                entry.samples += 1;
                true
            }
            None => false,
        }
    }

    pub async fn clear(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let n = sessions.len();
        sessions.clear();
        n
    }
}
