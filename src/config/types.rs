use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main operator configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Supervised workload settings
    pub workload: WorkloadConfig,

    /// Pebble API settings
    pub pebble: PebbleConfig,

    /// Data source relation settings
    pub relation: RelationConfig,

    /// Cluster API settings
    pub kubernetes: KubernetesConfig,

    /// Deferred event persistence
    pub state: StateConfig,

    /// Logging configuration
    pub log: LogConfig,
}

/// The InfluxDB 2 process running in the workload container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Name of the workload container in the pod
    pub container: String,

    /// Pebble service name (also used as the layer label)
    pub service: String,

    /// Command Pebble runs for the service
    pub command: String,

    /// First-boot setup values
    pub init: InitConfig,

    /// BoltDB metadata file
    pub bolt_path: String,

    /// TSM engine directory
    pub engine_path: String,

    /// Port the HTTP API binds to
    pub http_port: u16,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            container: "influxdb2".to_string(),
            service: "influxdb2".to_string(),
            command: "/entrypoint.sh influxd".to_string(),
            init: InitConfig::default(),
            bolt_path: "/var/lib/influxdbv2/influxd.bolt".to_string(),
            engine_path: "/var/lib/influxdbv2".to_string(),
            http_port: 8086,
        }
    }
}

/// Values consumed by the image entrypoint in `setup` mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    pub mode: String,
    pub username: String,
    pub password: String,
    pub org: String,
    pub bucket: String,
    /// Bucket retention, `0s` keeps data forever
    pub retention: String,
    pub admin_token: String,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            mode: "setup".to_string(),
            username: "admin".to_string(),
            password: "thisisatest123".to_string(),
            org: "influxdata".to_string(),
            bucket: "default".to_string(),
            retention: "0s".to_string(),
            admin_token: "asdfasdfasdf".to_string(),
        }
    }
}

/// Pebble API connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PebbleConfig {
    /// Pebble API address: `unix://<socket path>` or an `http://` base URL
    pub url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// How long to wait for a start/stop change to finish, in seconds
    pub change_timeout_secs: u64,
}

impl Default for PebbleConfig {
    fn default() -> Self {
        Self {
            url: "unix:///charm/containers/influxdb2/pebble.socket".to_string(),
            timeout_secs: 5,
            change_timeout_secs: 30,
        }
    }
}

/// Grafana data source relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    /// Relation endpoint name
    pub name: String,

    /// Value published under `source-type`
    pub source_type: String,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            name: "grafana-source".to_string(),
            source_type: "influxdb".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    /// Run the StatefulSet reconciler on install and clean up on stop
    pub enabled: bool,

    /// Service account the pod template must use
    pub service_account: String,

    /// ClusterIP service created next to the workload
    pub service_name: String,

    /// Opaque secret created next to the workload
    pub auth_secret: String,

    /// Port exposed by the auxiliary ClusterIP service
    pub service_port: i32,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_account: "influxdb2".to_string(),
            service_name: "influxdb2".to_string(),
            auth_secret: "influxdb2-auth".to_string(),
            service_port: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// JSON file holding deferred events between dispatches
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".unit-state.json"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level filter used when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human readable output
    pub json: bool,

    /// Directory for daily rolling log files, console only when unset
    pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}
