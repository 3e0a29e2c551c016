//! Kubernetes API integration
//!
//! Runs independently of the Pebble reconciler: it makes the pod run under a
//! service account with enough permissions and maintains the auxiliary Service
//! and Secret next to the workload.

mod auth;
mod cluster;
mod reconciler;
mod resources;

pub use auth::{AuthContext, ClusterConnector, InClusterConnector};
pub use cluster::{ClusterApi, KubeCluster};
pub use reconciler::{AuxiliaryResources, ClusterOutcome, ClusterPhase, StatefulSetReconciler};
pub use resources::{
    create_auth_secret, create_influxdb2_service, is_patched, patch_stateful_set, template_meta,
    token_secret_name, SERVICE_ACCOUNT_MOUNT_PATH,
};
