use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use super::MonitorConfig;
use crate::services::RemoteConfigProvider;

/// Name of the remote-config document holding monitor parameters.
pub const REMOTE_CONFIG_NAME: &str = "audio_quality_monitor";

/// Holds the live configuration. Readers get a cheap `Arc` snapshot, so a swap never tears a
/// half-updated config under a running tick.
pub struct ConfigurationManager {
    provider: Arc<dyn RemoteConfigProvider>,
    current: RwLock<Arc<MonitorConfig>>,
}

impl ConfigurationManager {
    pub fn new(provider: Arc<dyn RemoteConfigProvider>) -> Self {
        Self {
            provider,
            current: RwLock::new(Arc::new(MonitorConfig::default())),
        }
    }

    /// Fetches remote parameters. Any failure leaves the hardcoded defaults in place.
    pub async fn load(&self) -> Arc<MonitorConfig> {
        let config = match self.provider.fetch(REMOTE_CONFIG_NAME).await {
            Ok(map) => {
                info!(fields = map.len(), "remote monitor configuration loaded");
                MonitorConfig::from_remote(&map)
            }
            Err(e) => {
                warn!(error = %e, "remote configuration unavailable, using defaults");
                MonitorConfig::default()
            }
        };
        self.replace(config)
    }

    pub fn current(&self) -> Arc<MonitorConfig> {
        let guard = self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, config: MonitorConfig) -> Arc<MonitorConfig> {
        let config = Arc::new(config);
        let mut guard = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::clone(&config);
        config
    }
}
