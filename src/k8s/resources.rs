//! Kubernetes resource construction
//!
//! Auxiliary Service/Secret creation and the StatefulSet service-account patch

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{
    Secret, SecretVolumeSource, Service, ServiceAccount, ServicePort, ServiceSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Where Kubernetes expects the service account token inside a container
pub const SERVICE_ACCOUNT_MOUNT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const APP_NAME_LABEL: &str = "app.kubernetes.io/name";

/// Common metadata for resources owned by the application
pub fn template_meta(name: &str, namespace: &str, app: &str) -> ObjectMeta {
    let mut labels = BTreeMap::new();
    labels.insert(APP_NAME_LABEL.to_string(), app.to_string());

    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels),
        ..Default::default()
    }
}

/// ClusterIP service forwarding `port` to the InfluxDB HTTP port of the app's pods
pub fn create_influxdb2_service(
    name: &str,
    namespace: &str,
    app: &str,
    port: i32,
    target_port: i32,
) -> Service {
    let mut selector = BTreeMap::new();
    selector.insert(APP_NAME_LABEL.to_string(), app.to_string());

    Service {
        metadata: template_meta(name, namespace, app),
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                port,
                target_port: Some(IntOrString::Int(target_port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn create_auth_secret(name: &str, namespace: &str, app: &str) -> Secret {
    Secret {
        metadata: template_meta(name, namespace, app),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Whether the StatefulSet's pods already run as `service_account`
pub fn is_patched(stateful_set: &StatefulSet, service_account: &str) -> bool {
    stateful_set
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|pod| pod.service_account_name.as_deref())
        == Some(service_account)
}

/// Name of the token secret attached to a service account
pub fn token_secret_name(account: &ServiceAccount) -> Result<String> {
    account
        .secrets
        .as_ref()
        .and_then(|secrets| secrets.first())
        .and_then(|reference| reference.name.clone())
        .ok_or_else(|| {
            Error::Cluster(format!(
                "service account {} has no token secret",
                account.metadata.name.as_deref().unwrap_or("<unnamed>")
            ))
        })
}

/// Switch the pod template to `service_account` and mount its token secret into
/// `container`. Applying the patch twice yields the same StatefulSet.
pub fn patch_stateful_set(
    mut stateful_set: StatefulSet,
    service_account: &str,
    token_secret: &str,
    container: &str,
) -> Result<StatefulSet> {
    let volume_name = format!("{}-service-account", service_account);

    let pod = stateful_set
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .ok_or_else(|| Error::Cluster("StatefulSet has no pod template".to_string()))?;

    pod.service_account_name = Some(service_account.to_string());

    let volumes = pod.volumes.get_or_insert_with(Vec::new);
    volumes.retain(|volume| volume.name != volume_name);
    volumes.push(Volume {
        name: volume_name.clone(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(token_secret.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    });

    let workload = pod
        .containers
        .iter_mut()
        .find(|c| c.name == container)
        .ok_or_else(|| Error::Cluster(format!("container {} not in pod template", container)))?;

    let mounts = workload.volume_mounts.get_or_insert_with(Vec::new);
    mounts.retain(|mount| mount.name != volume_name);
    mounts.push(VolumeMount {
        mount_path: SERVICE_ACCOUNT_MOUNT_PATH.to_string(),
        name: volume_name,
        ..Default::default()
    });

    Ok(stateful_set)
}
