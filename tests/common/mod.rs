//! In-memory collaborators shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use influxdb2_operator::charm::UnitStatus;
use influxdb2_operator::error::{Error, Result};
use influxdb2_operator::model::{
    AddressResolver, LeadershipQuery, RelationDataBus, RelationId, RelationRecord, StatusSink,
};
use influxdb2_operator::pebble::{
    Layer, PebbleError, Plan, ServiceInfo, ServiceState, Supervisor,
};

/// Supervisor calls in the order they were made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetPlan,
    AddLayer { label: String, combine: bool },
    GetService(String),
    Stop(String),
    Start(String),
}

/// Pebble stand-in: keeps a plan and per-service states, records every call, and
/// can fail the next call of a given kind exactly once.
#[derive(Default)]
pub struct FakeSupervisor {
    plan: Mutex<Plan>,
    states: Mutex<HashMap<String, ServiceState>>,
    calls: Mutex<Vec<Call>>,
    next_plan_error: Mutex<Option<PebbleError>>,
    next_layer_error: Mutex<Option<PebbleError>>,
    next_start_error: Mutex<Option<PebbleError>>,
}

impl FakeSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(self, plan: Plan) -> Self {
        *self.plan.lock().unwrap() = plan;
        self
    }

    pub fn with_state(self, service: &str, state: ServiceState) -> Self {
        self.states
            .lock()
            .unwrap()
            .insert(service.to_string(), state);
        self
    }

    pub fn fail_next_get_plan(&self, err: PebbleError) {
        *self.next_plan_error.lock().unwrap() = Some(err);
    }

    pub fn fail_next_add_layer(&self, err: PebbleError) {
        *self.next_layer_error.lock().unwrap() = Some(err);
    }

    pub fn fail_next_start(&self, err: PebbleError) {
        *self.next_start_error.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn plan(&self) -> Plan {
        self.plan.lock().unwrap().clone()
    }

    pub fn state(&self, service: &str) -> Option<ServiceState> {
        self.states.lock().unwrap().get(service).copied()
    }

    pub fn count(&self, matcher: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matcher(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Supervisor for FakeSupervisor {
    async fn get_plan(&self) -> std::result::Result<Plan, PebbleError> {
        self.record(Call::GetPlan);
        if let Some(err) = self.next_plan_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self.plan.lock().unwrap().clone())
    }

    async fn add_layer(
        &self,
        label: &str,
        layer: &Layer,
        combine: bool,
    ) -> std::result::Result<(), PebbleError> {
        self.record(Call::AddLayer {
            label: label.to_string(),
            combine,
        });
        if let Some(err) = self.next_layer_error.lock().unwrap().take() {
            return Err(err);
        }
        let mut plan = self.plan.lock().unwrap();
        for (name, service) in &layer.services {
            plan.services.insert(name.clone(), service.clone());
        }
        Ok(())
    }

    async fn get_service(&self, name: &str) -> std::result::Result<ServiceInfo, PebbleError> {
        self.record(Call::GetService(name.to_string()));
        match self.states.lock().unwrap().get(name) {
            Some(state) => Ok(ServiceInfo {
                name: name.to_string(),
                current: *state,
            }),
            None => Err(PebbleError::ServiceNotFound(name.to_string())),
        }
    }

    async fn stop(&self, name: &str) -> std::result::Result<(), PebbleError> {
        self.record(Call::Stop(name.to_string()));
        self.states
            .lock()
            .unwrap()
            .insert(name.to_string(), ServiceState::Inactive);
        Ok(())
    }

    async fn start(&self, name: &str) -> std::result::Result<(), PebbleError> {
        self.record(Call::Start(name.to_string()));
        if let Some(err) = self.next_start_error.lock().unwrap().take() {
            return Err(err);
        }
        self.states
            .lock()
            .unwrap()
            .insert(name.to_string(), ServiceState::Active);
        Ok(())
    }
}

/// Runtime stand-in recording statuses and relation writes
pub struct FakeModel {
    leader: Mutex<Option<bool>>,
    address: Mutex<Option<String>>,
    statuses: Mutex<Vec<UnitStatus>>,
    relation_data: Mutex<HashMap<RelationId, RelationRecord>>,
}

impl FakeModel {
    pub fn new(leader: bool) -> Self {
        Self {
            leader: Mutex::new(Some(leader)),
            address: Mutex::new(Some("10.0.0.1".to_string())),
            statuses: Mutex::new(Vec::new()),
            relation_data: Mutex::new(HashMap::new()),
        }
    }

    /// Leadership queries fail
    pub fn without_leadership(self) -> Self {
        *self.leader.lock().unwrap() = None;
        self
    }

    /// Address lookups fail
    pub fn without_address(self) -> Self {
        *self.address.lock().unwrap() = None;
        self
    }

    pub fn with_status(self, status: UnitStatus) -> Self {
        self.statuses.lock().unwrap().push(status);
        self
    }

    pub fn status(&self) -> Option<UnitStatus> {
        self.statuses.lock().unwrap().last().cloned()
    }

    pub fn statuses(&self) -> Vec<UnitStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn relation_data(&self, relation: &RelationId) -> Option<RelationRecord> {
        self.relation_data.lock().unwrap().get(relation).cloned()
    }
}

#[async_trait]
impl LeadershipQuery for FakeModel {
    async fn is_leader(&self) -> Result<bool> {
        self.leader.lock().unwrap().ok_or_else(|| Error::HookTool {
            tool: "is-leader".to_string(),
            message: "unavailable".to_string(),
        })
    }
}

#[async_trait]
impl StatusSink for FakeModel {
    async fn set_status(&self, status: &UnitStatus) -> Result<()> {
        self.statuses.lock().unwrap().push(status.clone());
        Ok(())
    }
}

#[async_trait]
impl RelationDataBus for FakeModel {
    async fn update_unit_data(&self, relation: &RelationId, record: &RelationRecord) -> Result<()> {
        self.relation_data
            .lock()
            .unwrap()
            .entry(relation.clone())
            .or_default()
            .extend(record.clone());
        Ok(())
    }
}

#[async_trait]
impl AddressResolver for FakeModel {
    async fn private_address(&self) -> Result<String> {
        self.address.lock().unwrap().clone().ok_or_else(|| Error::HookTool {
            tool: "unit-get".to_string(),
            message: "no address".to_string(),
        })
    }
}
