//! Namespaced access to the resources the operator touches

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Secret, Service, ServiceAccount};
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

use crate::error::{Error, Result};

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_stateful_set(&self, name: &str) -> Result<StatefulSet>;

    async fn replace_stateful_set(&self, name: &str, stateful_set: &StatefulSet) -> Result<()>;

    async fn get_service_account(&self, name: &str) -> Result<ServiceAccount>;

    /// Create `service`; one that already exists is left alone
    async fn create_service(&self, service: &Service) -> Result<()>;

    /// Create `secret`; one that already exists is left alone
    async fn create_secret(&self, secret: &Secret) -> Result<()>;

    /// Delete a service; a missing one is not an error
    async fn delete_service(&self, name: &str) -> Result<()>;

    /// Delete a secret; a missing one is not an error
    async fn delete_secret(&self, name: &str) -> Result<()>;
}

/// `ClusterApi` backed by a kube client scoped to the model's namespace
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: String,
}

impl KubeCluster {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

fn has_code(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == code)
}

/// 403s mean the application has not been trusted with cluster access
fn classify(err: kube::Error) -> Error {
    match err {
        kube::Error::Api(response) if response.code == 403 => {
            Error::PermissionDenied(response.message)
        }
        other => Error::Kube(other),
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn get_stateful_set(&self, name: &str) -> Result<StatefulSet> {
        self.api::<StatefulSet>().get(name).await.map_err(classify)
    }

    async fn replace_stateful_set(&self, name: &str, stateful_set: &StatefulSet) -> Result<()> {
        self.api::<StatefulSet>()
            .replace(name, &PostParams::default(), stateful_set)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn get_service_account(&self, name: &str) -> Result<ServiceAccount> {
        self.api::<ServiceAccount>().get(name).await.map_err(classify)
    }

    async fn create_service(&self, service: &Service) -> Result<()> {
        match self.api::<Service>().create(&PostParams::default(), service).await {
            Ok(_) => Ok(()),
            Err(e) if has_code(&e, 409) => {
                debug!("Service {:?} already exists", service.metadata.name);
                Ok(())
            }
            Err(e) => Err(classify(e)),
        }
    }

    async fn create_secret(&self, secret: &Secret) -> Result<()> {
        match self.api::<Secret>().create(&PostParams::default(), secret).await {
            Ok(_) => Ok(()),
            Err(e) if has_code(&e, 409) => {
                debug!("Secret {:?} already exists", secret.metadata.name);
                Ok(())
            }
            Err(e) => Err(classify(e)),
        }
    }

    async fn delete_service(&self, name: &str) -> Result<()> {
        match self.api::<Service>().delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if has_code(&e, 404) => Ok(()),
            Err(e) => Err(classify(e)),
        }
    }

    async fn delete_secret(&self, name: &str) -> Result<()> {
        match self.api::<Secret>().delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) if has_code(&e, 404) => Ok(()),
            Err(e) => Err(classify(e)),
        }
    }
}
