//! Desired Pebble layer for the InfluxDB 2 workload

use std::collections::BTreeMap;

use crate::config::WorkloadConfig;
use crate::pebble::{Layer, Override, Service, Startup};

/// Build the layer the workload should run with.
///
/// Pure function of the workload configuration: equal inputs always produce equal
/// layers, which is what lets the reconciler skip unchanged plans.
pub fn influxdb2_layer(workload: &WorkloadConfig) -> Layer {
    let init = &workload.init;
    let environment: BTreeMap<String, String> = [
        ("DOCKER_INFLUXDB_INIT_MODE", init.mode.clone()),
        ("DOCKER_INFLUXDB_INIT_USERNAME", init.username.clone()),
        ("DOCKER_INFLUXDB_INIT_PASSWORD", init.password.clone()),
        ("DOCKER_INFLUXDB_INIT_ORG", init.org.clone()),
        ("DOCKER_INFLUXDB_INIT_BUCKET", init.bucket.clone()),
        ("DOCKER_INFLUXDB_INIT_RETENTION", init.retention.clone()),
        ("DOCKER_INFLUXDB_INIT_ADMIN_TOKEN", init.admin_token.clone()),
        ("INFLUXD_BOLT_PATH", workload.bolt_path.clone()),
        ("INFLUXD_ENGINE_PATH", workload.engine_path.clone()),
        ("INFLUXD_HTTP_BIND_ADDRESS", format!(":{}", workload.http_port)),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect();

    let service = Service {
        summary: Some(format!("{} service", workload.service)),
        override_policy: Some(Override::Replace),
        command: Some(workload.command.clone()),
        startup: Some(Startup::Enabled),
        environment,
        extra: BTreeMap::new(),
    };

    Layer {
        summary: Some(format!("{} layer", workload.service)),
        description: Some(format!("pebble config layer for {}", workload.service)),
        services: BTreeMap::from([(workload.service.clone(), service)]),
    }
}
