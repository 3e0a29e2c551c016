//! Operator configuration
//!
//! Every setting has a default that matches the values the operator ships with, so an
//! empty configuration file (or none at all) yields the stock InfluxDB 2 deployment.

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    InitConfig, KubernetesConfig, LogConfig, OperatorConfig, PebbleConfig, RelationConfig,
    StateConfig, WorkloadConfig,
};
