//! StatefulSet reconciliation against the cluster API

use std::fmt;
use tracing::{error, info, warn};

use super::auth::AuthContext;
use super::cluster::ClusterApi;
use super::resources::{
    create_auth_secret, create_influxdb2_service, is_patched, patch_stateful_set,
    token_secret_name,
};
use crate::charm::{UnitStatus, TRUST_MESSAGE};
use crate::config::KubernetesConfig;
use crate::error::{Error, Result};
use crate::model::StatusSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPhase {
    Authenticating,
    Checking,
    Patching,
    Done,
    Blocked,
    Deferred,
}

impl fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClusterPhase::Authenticating => "authenticating",
            ClusterPhase::Checking => "checking",
            ClusterPhase::Patching => "patching",
            ClusterPhase::Done => "done",
            ClusterPhase::Blocked => "blocked",
            ClusterPhase::Deferred => "deferred",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterOutcome {
    Done { patched: bool },
    /// Needs operator action; the message is meant for the unit status
    Blocked {
        phase: ClusterPhase,
        message: String,
        /// Cleared by trusting the application, so worth retrying later
        awaits_trust: bool,
    },
    Deferred { phase: ClusterPhase, reason: String },
}

impl ClusterOutcome {
    pub fn phase(&self) -> ClusterPhase {
        match self {
            ClusterOutcome::Done { .. } => ClusterPhase::Done,
            ClusterOutcome::Blocked { .. } => ClusterPhase::Blocked,
            ClusterOutcome::Deferred { .. } => ClusterPhase::Deferred,
        }
    }
}

/// Makes the application's StatefulSet run under the configured service account
pub struct StatefulSetReconciler<'a> {
    app: &'a str,
    container: &'a str,
    settings: &'a KubernetesConfig,
}

impl<'a> StatefulSetReconciler<'a> {
    pub fn new(app: &'a str, container: &'a str, settings: &'a KubernetesConfig) -> Self {
        Self {
            app,
            container,
            settings,
        }
    }

    pub async fn reconcile<S>(&self, auth: &AuthContext, status: &S) -> ClusterOutcome
    where
        S: StatusSink + ?Sized,
    {
        let cluster = match auth.session().await {
            Ok(cluster) => cluster,
            Err(e) => return fail(ClusterPhase::Authenticating, e),
        };

        let stateful_set = match cluster.get_stateful_set(self.app).await {
            Ok(stateful_set) => stateful_set,
            Err(e) => return fail(ClusterPhase::Checking, e),
        };
        if is_patched(&stateful_set, &self.settings.service_account) {
            info!("StatefulSet {} already runs as {}", self.app, self.settings.service_account);
            return ClusterOutcome::Done { patched: false };
        }

        let patching = UnitStatus::maintenance("Patching StatefulSet for additional k8s permissions");
        if let Err(e) = status.set_status(&patching).await {
            warn!("Failed to set status: {}", e);
        }

        match self.patch(cluster.as_ref(), stateful_set).await {
            Ok(()) => {
                info!("Patched StatefulSet {}", self.app);
                ClusterOutcome::Done { patched: true }
            }
            Err(e) => fail(ClusterPhase::Patching, e),
        }
    }

    async fn patch(
        &self,
        cluster: &dyn ClusterApi,
        stateful_set: k8s_openapi::api::apps::v1::StatefulSet,
    ) -> Result<()> {
        let account = cluster
            .get_service_account(&self.settings.service_account)
            .await?;
        let token_secret = token_secret_name(&account)?;
        let patched = patch_stateful_set(
            stateful_set,
            &self.settings.service_account,
            &token_secret,
            self.container,
        )?;
        cluster.replace_stateful_set(self.app, &patched).await
    }
}

fn fail(phase: ClusterPhase, err: Error) -> ClusterOutcome {
    match err {
        Error::PermissionDenied(reason) => {
            warn!("Insufficient cluster permissions while {}: {}", phase, reason);
            ClusterOutcome::Blocked {
                phase,
                message: TRUST_MESSAGE.to_string(),
                awaits_trust: true,
            }
        }
        e if e.is_transient() => {
            warn!("Cluster API unavailable while {}, deferring: {}", phase, e);
            ClusterOutcome::Deferred {
                phase,
                reason: e.to_string(),
            }
        }
        e => {
            error!("Cluster reconciliation failed while {}: {}", phase, e);
            ClusterOutcome::Blocked {
                phase,
                message: format!("StatefulSet patch failed: {}", e),
                awaits_trust: false,
            }
        }
    }
}

/// The Service and Secret the application keeps next to its pods
pub struct AuxiliaryResources<'a> {
    app: &'a str,
    namespace: &'a str,
    settings: &'a KubernetesConfig,
    http_port: u16,
}

impl<'a> AuxiliaryResources<'a> {
    pub fn new(
        app: &'a str,
        namespace: &'a str,
        settings: &'a KubernetesConfig,
        http_port: u16,
    ) -> Self {
        Self {
            app,
            namespace,
            settings,
            http_port,
        }
    }

    pub async fn ensure(&self, cluster: &dyn ClusterApi) -> Result<()> {
        info!("Creating additional Kubernetes resources");
        let service = create_influxdb2_service(
            &self.settings.service_name,
            self.namespace,
            self.app,
            self.settings.service_port,
            i32::from(self.http_port),
        );
        cluster.create_service(&service).await?;

        let secret = create_auth_secret(&self.settings.auth_secret, self.namespace, self.app);
        cluster.create_secret(&secret).await
    }

    pub async fn remove(&self, cluster: &dyn ClusterApi) -> Result<()> {
        info!("Cleaning up Kubernetes resources");
        cluster.delete_secret(&self.settings.auth_secret).await?;
        cluster.delete_service(&self.settings.service_name).await
    }
}
