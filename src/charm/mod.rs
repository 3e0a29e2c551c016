//! InfluxDB 2 charm
//!
//! Event handlers wiring the layer builder, the Pebble reconciler, the data source
//! publisher and, when enabled, the cluster reconciler. Handlers never fail: every
//! error ends as a log line, a unit status or a deferral.

mod layer;
mod reconciler;
mod relation;
mod status;

pub use layer::influxdb2_layer;
pub use reconciler::{ReconcileOutcome, ReconcilePhase, Reconciler};
pub use relation::{
    PublishOutcome, SourcePublisher, PORT_KEY, PRIVATE_ADDRESS_KEY, SOURCE_TYPE_KEY,
};
pub use status::{status_for, UnitStatus, READY_MESSAGE, TRUST_MESSAGE};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::OperatorConfig;
use crate::framework::{Event, EventHandler, HandlerOutcome};
use crate::k8s::{AuthContext, AuxiliaryResources, ClusterOutcome, StatefulSetReconciler};
use crate::model::{Model, RelationId};
use crate::pebble::Supervisor;

/// Cluster access for the optional StatefulSet path
pub struct ClusterContext {
    pub auth: AuthContext,
    /// Application name, also the StatefulSet name
    pub app: String,
    pub namespace: String,
}

pub struct InfluxdbCharm<M, S> {
    config: OperatorConfig,
    model: M,
    supervisor: S,
    cluster: Option<ClusterContext>,
}

impl<M: Model, S: Supervisor> InfluxdbCharm<M, S> {
    pub fn new(config: OperatorConfig, model: M, supervisor: S) -> Self {
        Self {
            config,
            model,
            supervisor,
            cluster: None,
        }
    }

    pub fn with_cluster(mut self, cluster: ClusterContext) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn supervisor(&self) -> &S {
        &self.supervisor
    }

    pub async fn on_config_changed(&self) -> HandlerOutcome {
        let workload = &self.config.workload;
        let desired = influxdb2_layer(workload);

        let outcome = Reconciler::new(&self.supervisor, &workload.service, &workload.service)
            .reconcile(&desired)
            .await;
        debug!("Reconciliation finished in phase {}", outcome.phase());

        self.report(&outcome, &workload.service).await
    }

    /// Finish a pass whose layer was applied but whose service did not start
    pub async fn on_start_service(&self, service: &str) -> HandlerOutcome {
        let outcome = Reconciler::new(&self.supervisor, &self.config.workload.service, service)
            .resume_start()
            .await;

        self.report(&outcome, service).await
    }

    async fn report(&self, outcome: &ReconcileOutcome, service: &str) -> HandlerOutcome {
        if let Some(status) = status_for(outcome) {
            self.set_status(&status).await;
        }

        match outcome {
            ReconcileOutcome::Done { .. } => HandlerOutcome::Completed,
            // the layer is in the plan already, a rerun would find nothing to do
            ReconcileOutcome::Deferred {
                phase: ReconcilePhase::Starting,
                ..
            } => HandlerOutcome::Reschedule(Event::StartService {
                service: service.to_string(),
            }),
            ReconcileOutcome::Deferred { .. } => HandlerOutcome::Deferred,
        }
    }

    pub async fn on_pebble_ready(&self, container: &str) -> HandlerOutcome {
        if container != self.config.workload.container {
            debug!("Ignoring pebble-ready for container {}", container);
            return HandlerOutcome::Completed;
        }
        self.on_config_changed().await
    }

    pub async fn on_relation_changed(&self, relation: &RelationId) -> HandlerOutcome {
        if relation.name != self.config.relation.name {
            debug!("No handler for relation {}", relation);
            return HandlerOutcome::Completed;
        }

        let is_leader = match self.model.is_leader().await {
            Ok(is_leader) => is_leader,
            Err(e) => {
                warn!("Leadership unknown, deferring {}: {}", relation, e);
                return HandlerOutcome::Deferred;
            }
        };

        let publisher = SourcePublisher::from_config(&self.config.workload, &self.config.relation);
        if let Err(e) = publisher
            .publish(is_leader, relation, &self.model, &self.model)
            .await
        {
            error!("Failed to publish data source details on {}: {}", relation, e);
        }
        HandlerOutcome::Completed
    }

    pub async fn on_install(&self) -> HandlerOutcome {
        let Some(cluster) = &self.cluster else {
            return HandlerOutcome::Completed;
        };

        let reconciler = StatefulSetReconciler::new(
            &cluster.app,
            &self.config.workload.container,
            &self.config.kubernetes,
        );
        let patched = match reconciler.reconcile(&cluster.auth, &self.model).await {
            ClusterOutcome::Done { patched } => patched,
            ClusterOutcome::Blocked {
                message,
                awaits_trust,
                ..
            } => {
                self.set_status(&UnitStatus::blocked(message)).await;
                return if awaits_trust {
                    HandlerOutcome::Deferred
                } else {
                    HandlerOutcome::Completed
                };
            }
            ClusterOutcome::Deferred { .. } => return HandlerOutcome::Deferred,
        };

        self.set_status(&UnitStatus::maintenance("Creating k8s resources"))
            .await;
        let resources = AuxiliaryResources::new(
            &cluster.app,
            &cluster.namespace,
            &self.config.kubernetes,
            self.config.workload.http_port,
        );
        let result = match cluster.auth.session().await {
            Ok(session) => resources.ensure(session.as_ref()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Failed to create Kubernetes resources, deferring: {}", e);
            return HandlerOutcome::Deferred;
        }

        // pods restart with the patched template; config-changed reports readiness
        if patched {
            self.set_status(&UnitStatus::maintenance("Waiting for changes to apply"))
                .await;
        }
        HandlerOutcome::Completed
    }

    pub async fn on_stop(&self) -> HandlerOutcome {
        let Some(cluster) = &self.cluster else {
            return HandlerOutcome::Completed;
        };

        let resources = AuxiliaryResources::new(
            &cluster.app,
            &cluster.namespace,
            &self.config.kubernetes,
            self.config.workload.http_port,
        );
        let result = match cluster.auth.session().await {
            Ok(session) => resources.remove(session.as_ref()).await,
            Err(e) => Err(e),
        };
        // the unit is going away, a deferred stop would never run
        if let Err(e) = result {
            error!("Failed to clean up Kubernetes resources: {}", e);
        }
        HandlerOutcome::Completed
    }

    async fn set_status(&self, status: &UnitStatus) {
        match self.model.set_status(status).await {
            Ok(()) => info!("Unit status set to {}", status),
            Err(e) => error!("Failed to set unit status {}: {}", status, e),
        }
    }
}

#[async_trait]
impl<M: Model, S: Supervisor> EventHandler for InfluxdbCharm<M, S> {
    async fn handle(&self, event: &Event) -> HandlerOutcome {
        match event {
            Event::Install => self.on_install().await,
            Event::ConfigChanged => self.on_config_changed().await,
            Event::PebbleReady { container } => self.on_pebble_ready(container).await,
            Event::RelationChanged { relation } => self.on_relation_changed(relation).await,
            Event::Stop => self.on_stop().await,
            Event::StartService { service } => self.on_start_service(service).await,
            Event::Other { hook } => {
                debug!("No handler for {}", hook);
                HandlerOutcome::Completed
            }
        }
    }
}
