//! Pebble process supervisor integration
//!
//! The workload container runs Pebble as PID 1. The operator talks to its HTTP API to
//! read the current plan, push layers and start or stop services.

mod client;
mod layer;

pub use client::PebbleClient;
pub use layer::{Layer, Override, Plan, Service, ServiceInfo, ServiceState, Startup};

use async_trait::async_trait;
use thiserror::Error;

/// Pebble API errors
#[derive(Error, Debug)]
pub enum PebbleError {
    /// The API could not be reached (socket not ready, timeout, refused)
    #[error("Connection error: {0}")]
    Connection(String),

    /// The API answered with an error envelope
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    /// The named service is not part of the plan
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// A response or document could not be (de)serialized
    #[error("Decode error: {0}")]
    Decode(String),

    /// A start/stop change finished with an error
    #[error("Change {change} failed: {message}")]
    ChangeFailed { change: String, message: String },
}

impl PebbleError {
    /// Connection and API failures are retried through event redelivery.
    pub fn is_transient(&self) -> bool {
        matches!(self, PebbleError::Connection(_) | PebbleError::Api { .. })
    }
}

/// Operations the operator needs from the process supervisor.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Current combined plan
    async fn get_plan(&self) -> Result<Plan, PebbleError>;

    /// Add a layer under `label`; with `combine` the layer merges into an existing one
    async fn add_layer(&self, label: &str, layer: &Layer, combine: bool)
        -> Result<(), PebbleError>;

    /// Runtime information for a single service
    async fn get_service(&self, name: &str) -> Result<ServiceInfo, PebbleError>;

    async fn stop(&self, name: &str) -> Result<(), PebbleError>;

    async fn start(&self, name: &str) -> Result<(), PebbleError>;
}
