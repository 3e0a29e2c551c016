//! Orchestration runtime collaborators
//!
//! The runtime is reached through the hook tools Juju places on `PATH` for the
//! duration of a dispatch. Each concern gets its own trait so handlers can be
//! exercised against in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::process::Command;
use tracing::debug;

use crate::charm::UnitStatus;
use crate::error::{Error, Result};

/// A relation instance, rendered by the runtime as `<endpoint>:<id>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationId {
    pub name: String,
    pub id: u64,
}

impl RelationId {
    pub fn new(name: impl Into<String>, id: u64) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.id)
    }
}

impl FromStr for RelationId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, id) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidEvent(format!("malformed relation id: {}", s)))?;
        let id = id
            .parse()
            .map_err(|_| Error::InvalidEvent(format!("malformed relation id: {}", s)))?;
        if name.is_empty() {
            return Err(Error::InvalidEvent(format!("malformed relation id: {}", s)));
        }
        Ok(Self::new(name, id))
    }
}

/// Key/value pairs a unit writes into its side of a relation
pub type RelationRecord = BTreeMap<String, String>;

#[async_trait]
pub trait LeadershipQuery: Send + Sync {
    async fn is_leader(&self) -> Result<bool>;
}

#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn set_status(&self, status: &UnitStatus) -> Result<()>;
}

/// Per-relation, per-unit data store
#[async_trait]
pub trait RelationDataBus: Send + Sync {
    /// Merge `record` into this unit's data bag of `relation`
    async fn update_unit_data(&self, relation: &RelationId, record: &RelationRecord) -> Result<()>;
}

#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Address other units use to reach this one
    async fn private_address(&self) -> Result<String>;
}

/// Everything a handler may ask of the runtime
pub trait Model: LeadershipQuery + StatusSink + RelationDataBus + AddressResolver {}

impl<T> Model for T where T: LeadershipQuery + StatusSink + RelationDataBus + AddressResolver {}

/// Model backed by the Juju hook tools
#[derive(Debug, Clone, Default)]
pub struct HookTools {
    /// Directory holding the tools; resolved through `PATH` when unset
    bin_dir: Option<PathBuf>,
}

impl HookTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    async fn run(&self, tool: &str, args: &[String]) -> Result<String> {
        let program = match &self.bin_dir {
            Some(dir) => dir.join(tool),
            None => PathBuf::from(tool),
        };
        debug!("Running hook tool {} {:?}", tool, args);

        let output = Command::new(&program)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::HookTool {
                tool: tool.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::HookTool {
                tool: tool.to_string(),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn status_set_args(status: &UnitStatus) -> Vec<String> {
    vec![status.name().to_string(), status.message().to_string()]
}

fn relation_set_args(relation: &RelationId, record: &RelationRecord) -> Vec<String> {
    let mut args = vec!["-r".to_string(), relation.to_string()];
    args.extend(record.iter().map(|(key, value)| format!("{}={}", key, value)));
    args
}

#[async_trait]
impl LeadershipQuery for HookTools {
    async fn is_leader(&self) -> Result<bool> {
        let raw = self.run("is-leader", &["--format=json".to_string()]).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl StatusSink for HookTools {
    async fn set_status(&self, status: &UnitStatus) -> Result<()> {
        self.run("status-set", &status_set_args(status)).await?;
        Ok(())
    }
}

#[async_trait]
impl RelationDataBus for HookTools {
    async fn update_unit_data(&self, relation: &RelationId, record: &RelationRecord) -> Result<()> {
        self.run("relation-set", &relation_set_args(relation, record))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AddressResolver for HookTools {
    async fn private_address(&self) -> Result<String> {
        let address = self.run("unit-get", &["private-address".to_string()]).await?;
        if address.is_empty() {
            return Err(Error::HookTool {
                tool: "unit-get".to_string(),
                message: "empty private-address".to_string(),
            });
        }
        Ok(address)
    }
}
