//! Grafana data source relation

use tracing::{debug, info};

use crate::config::{RelationConfig, WorkloadConfig};
use crate::error::Result;
use crate::model::{AddressResolver, RelationDataBus, RelationId, RelationRecord};

pub const PRIVATE_ADDRESS_KEY: &str = "private-address";
pub const PORT_KEY: &str = "port";
pub const SOURCE_TYPE_KEY: &str = "source-type";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Not the leader, nothing written
    Skipped,
    Published(RelationRecord),
}

/// Publishes connection details for consumers of the data source relation
#[derive(Debug, Clone)]
pub struct SourcePublisher {
    port: u16,
    source_type: String,
}

impl SourcePublisher {
    pub fn new(port: u16, source_type: impl Into<String>) -> Self {
        Self {
            port,
            source_type: source_type.into(),
        }
    }

    pub fn from_config(workload: &WorkloadConfig, relation: &RelationConfig) -> Self {
        Self::new(workload.http_port, relation.source_type.clone())
    }

    /// Write this unit's address, port and source type into `relation`.
    ///
    /// Only the leader publishes. An address lookup failure aborts the call before
    /// anything is written.
    pub async fn publish<R, B>(
        &self,
        is_leader: bool,
        relation: &RelationId,
        resolver: &R,
        bus: &B,
    ) -> Result<PublishOutcome>
    where
        R: AddressResolver + ?Sized,
        B: RelationDataBus + ?Sized,
    {
        if !is_leader {
            debug!("Not the leader, leaving {} untouched", relation);
            return Ok(PublishOutcome::Skipped);
        }

        let address = resolver.private_address().await?;
        let record = self.record(address);
        bus.update_unit_data(relation, &record).await?;

        info!("Published data source details on {}", relation);
        Ok(PublishOutcome::Published(record))
    }

    fn record(&self, address: String) -> RelationRecord {
        RelationRecord::from([
            (PRIVATE_ADDRESS_KEY.to_string(), address),
            (PORT_KEY.to_string(), self.port.to_string()),
            (SOURCE_TYPE_KEY.to_string(), self.source_type.clone()),
        ])
    }
}
