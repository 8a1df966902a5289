use thiserror::Error;

/// Normalized error surface of the monitor's public API.
///
/// Collaborator traits return `anyhow::Result`; their failures are caught where they happen and
/// only reach callers through these variants.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("{0}")]
    Validation(String),

    #[error("{component} failed: {message}")]
    Collaborator {
        component: &'static str,
        message: String,
    },

    #[error("network unavailable: {0}")]
    Network(String),

    #[error("secure storage error: {0}")]
    Storage(String),

    #[error("cryptographic operation failed: {0}")]
    Crypto(String),
}

impl MonitorError {
    pub fn validation(message: impl Into<String>) -> Self {
        MonitorError::Validation(message.into())
    }

    pub fn collaborator(component: &'static str, err: &anyhow::Error) -> Self {
        MonitorError::Collaborator {
            component,
            message: format!("{err:#}"),
        }
    }

    /// Short tag used in telemetry and error reports. Never carries payload text.
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::Validation(_) => "validation",
            MonitorError::Collaborator { .. } => "collaborator",
            MonitorError::Network(_) => "network",
            MonitorError::Storage(_) => "storage",
            MonitorError::Crypto(_) => "crypto",
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
