//! Error types for the InfluxDB 2 operator.

use thiserror::Error;

use crate::pebble::PebbleError;

/// Result type alias for operator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types surfaced by the operator's collaborators
#[derive(Debug, Error)]
pub enum Error {
    /// Process supervisor (Pebble) failure
    #[error("Pebble error: {0}")]
    Pebble(#[from] PebbleError),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The application lacks the platform trust needed for cluster access
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A cluster resource is missing something the operator relies on
    #[error("Cluster resource error: {0}")]
    Cluster(String),

    /// A hook tool exited unsuccessfully or could not be spawned
    #[error("Hook tool `{tool}` failed: {message}")]
    HookTool { tool: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The dispatch path or its environment does not describe a known event
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

impl Error {
    /// Whether the triggering event should be deferred and redelivered later.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Pebble(e) => e.is_transient(),
            Error::Kube(kube::Error::Api(response)) => response.code >= 500,
            Error::Kube(_) => true,
            _ => false,
        }
    }
}
