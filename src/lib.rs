//! # influxdb2-operator
//!
//! Sidecar operator for InfluxDB 2 on Kubernetes.
//!
//! The operator keeps the Pebble layer of the `influxdb2` workload container in the
//! desired shape, restarting the service only when the layer actually changed, and
//! publishes the database's address to related Grafana applications.

pub mod charm;
pub mod config;
pub mod error;
pub mod framework;
pub mod k8s;
pub mod logging;
pub mod model;
pub mod pebble;

pub use charm::InfluxdbCharm;
pub use error::{Error, Result};
pub use framework::{dispatch, Event, HandlerOutcome};
