//! Cluster authentication
//!
//! The first successful connection is memoized in an [`AuthContext`] that callers
//! pass around explicitly. Failures are not cached, so a later event retries once
//! the application has been trusted.

use async_trait::async_trait;
use kube::Client;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

use super::cluster::{ClusterApi, KubeCluster};
use crate::error::{Error, Result};

#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ClusterApi>>;
}

/// Connects with the service account token mounted into the pod
pub struct InClusterConnector {
    namespace: String,
}

impl InClusterConnector {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl ClusterConnector for InClusterConnector {
    async fn connect(&self) -> Result<Arc<dyn ClusterApi>> {
        let config = kube::Config::incluster().map_err(|e| {
            debug!("In-cluster config unavailable: {}", e);
            Error::PermissionDenied(format!("in-cluster config unavailable: {}", e))
        })?;
        let client = Client::try_from(config)
            .map_err(|e| Error::PermissionDenied(format!("cannot build cluster client: {}", e)))?;

        Ok(Arc::new(KubeCluster::new(client, self.namespace.clone())))
    }
}

/// Memoized cluster session
pub struct AuthContext {
    connector: Box<dyn ClusterConnector>,
    session: OnceCell<Arc<dyn ClusterApi>>,
}

impl AuthContext {
    pub fn new(connector: impl ClusterConnector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            session: OnceCell::new(),
        }
    }

    /// Authenticated cluster access, connecting on first use
    pub async fn session(&self) -> Result<Arc<dyn ClusterApi>> {
        let session = self
            .session
            .get_or_try_init(|| self.connector.connect())
            .await?;
        Ok(Arc::clone(session))
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.initialized()
    }
}
