//! Pebble layer and plan documents
//!
//! Maps are `BTreeMap`s so that two documents describing the same services compare
//! equal and serialize to the same bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::PebbleError;

/// How a layer's service entry combines with an existing one of the same name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Override {
    Merge,
    Replace,
}

/// Whether Pebble starts the service automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Startup {
    Enabled,
    Disabled,
}

/// One supervised process definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(rename = "override", default, skip_serializing_if = "Option::is_none")]
    pub override_policy: Option<Override>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup: Option<Startup>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// Keys without a field of their own (`user`, `working-dir`, `after`, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml_ng::Value>,
}

/// A configuration layer submitted to Pebble
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub services: BTreeMap<String, Service>,
}

impl Layer {
    /// Render the layer in the YAML form the layers endpoint accepts.
    pub fn to_yaml(&self) -> Result<String, PebbleError> {
        serde_yaml_ng::to_string(self).map_err(|e| PebbleError::Decode(e.to_string()))
    }
}

/// The combined configuration Pebble is currently running with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
}

impl Plan {
    /// Parse the YAML returned by `GET /v1/plan?format=yaml`.
    pub fn from_yaml(raw: &str) -> Result<Self, PebbleError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(raw).map_err(|e| PebbleError::Decode(e.to_string()))
    }

    /// Compares only the service map: summaries and descriptions never trigger a change.
    /// Service keys are compared in full, including ones kept in [`Service::extra`].
    pub fn services_match(&self, layer: &Layer) -> bool {
        self.services == layer.services
    }
}

/// Runtime state of a service as reported by Pebble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Active,
    Inactive,
    Error,
    #[serde(other)]
    Unknown,
}

/// Entry of the `GET /v1/services` result
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub current: ServiceState,
}

impl ServiceInfo {
    pub fn is_running(&self) -> bool {
        self.current == ServiceState::Active
    }
}
