//! Event dispatch
//!
//! Each hook invocation maps to one [`Event`]. Events a handler defers are stored in
//! a small JSON file and redelivered, oldest first, at the start of the next
//! dispatch before the new event runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::RelationId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Event {
    Install,
    ConfigChanged,
    PebbleReady { container: String },
    RelationChanged { relation: RelationId },
    Stop,
    /// Queued by the operator itself when a service start failed after its layer
    /// was applied; never parsed from a dispatch path
    StartService { service: String },
    Other { hook: String },
}

impl Event {
    /// Parse a dispatch path such as `hooks/config-changed`.
    ///
    /// `relation_id` is the runtime's `JUJU_RELATION_ID`, required for relation hooks.
    pub fn from_dispatch(path: &str, relation_id: Option<&str>) -> Result<Self> {
        let hook = path.rsplit('/').next().unwrap_or(path).trim();
        if hook.is_empty() {
            return Err(Error::InvalidEvent(format!("empty hook name in {:?}", path)));
        }

        let event = match hook {
            "install" => Event::Install,
            "config-changed" => Event::ConfigChanged,
            "stop" => Event::Stop,
            _ => {
                if let Some(container) = hook.strip_suffix("-pebble-ready") {
                    Event::PebbleReady {
                        container: container.to_string(),
                    }
                } else if let Some(endpoint) = hook.strip_suffix("-relation-changed") {
                    let raw = relation_id.ok_or_else(|| {
                        Error::InvalidEvent(format!("{} dispatched without a relation id", hook))
                    })?;
                    let relation: RelationId = raw.parse()?;
                    if relation.name != endpoint {
                        return Err(Error::InvalidEvent(format!(
                            "{} dispatched for relation {}",
                            hook, relation
                        )));
                    }
                    Event::RelationChanged { relation }
                } else {
                    Event::Other {
                        hook: hook.to_string(),
                    }
                }
            }
        };

        Ok(event)
    }

    /// Hook name the event was parsed from
    pub fn hook_name(&self) -> String {
        match self {
            Event::Install => "install".to_string(),
            Event::ConfigChanged => "config-changed".to_string(),
            Event::Stop => "stop".to_string(),
            Event::PebbleReady { container } => format!("{}-pebble-ready", container),
            Event::RelationChanged { relation } => format!("{}-relation-changed", relation.name),
            Event::StartService { service } => format!("start-{}", service),
            Event::Other { hook } => hook.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Completed,
    /// Redeliver the event on the next dispatch
    Deferred,
    /// Queue a follow-up event for the next dispatch instead of redelivering this one
    Reschedule(Event),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> HandlerOutcome;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredEvent {
    pub id: Uuid,
    pub event: Event,
    pub deferred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    #[serde(default)]
    pub deferred: Vec<DeferredEvent>,
}

impl StoredState {
    /// Queue `event` unless an identical one is already waiting
    pub fn defer(&mut self, event: Event) {
        if self.deferred.iter().any(|queued| queued.event == event) {
            debug!("{} already deferred", event.hook_name());
            return;
        }
        self.deferred.push(DeferredEvent {
            id: Uuid::new_v4(),
            event,
            deferred_at: Utc::now(),
        });
    }
}

/// JSON file holding [`StoredState`] between dispatches
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where an unreadable store is moved before starting over
    pub fn corrupt_path(&self) -> PathBuf {
        self.path.with_extension("json.corrupt")
    }

    /// Load the queue. A file that no longer parses is moved to [`Self::corrupt_path`]
    /// and an empty queue is returned.
    pub async fn load(&self) -> Result<StoredState> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoredState::default()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(state),
            Err(e) => {
                let aside = self.corrupt_path();
                warn!(
                    "Deferred event store {} is unreadable ({}), moving it to {}",
                    self.path.display(),
                    e,
                    aside.display()
                );
                if let Err(e) = tokio::fs::rename(&self.path, &aside).await {
                    warn!("Failed to move {} aside: {}", self.path.display(), e);
                }
                Ok(StoredState::default())
            }
        }
    }

    /// Write through a temporary file so an interrupted hook never truncates the store
    pub async fn save(&self, state: &StoredState) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Outcome for the event that triggered this dispatch
    pub outcome: HandlerOutcome,
    /// Previously deferred events that were run again
    pub redelivered: usize,
    /// Events left in the queue afterwards
    pub pending: usize,
}

/// Redeliver deferred events, run `event`, and persist whatever is still deferred.
///
/// Store failures are logged and never fail the dispatch: an unreadable queue
/// starts empty, an unwritable one loses only the events queued by this run.
pub async fn dispatch<H>(handler: &H, store: &StateStore, event: Event) -> DispatchReport
where
    H: EventHandler + ?Sized,
{
    let mut state = match store.load().await {
        Ok(state) => state,
        Err(e) => {
            error!(
                "Failed to load deferred events from {}: {}",
                store.path().display(),
                e
            );
            StoredState::default()
        }
    };
    let queued = std::mem::take(&mut state.deferred);
    let redelivered = queued.len();

    for entry in queued {
        info!("Redelivering deferred {} ({})", entry.event.hook_name(), entry.id);
        match handler.handle(&entry.event).await {
            HandlerOutcome::Completed => {}
            HandlerOutcome::Deferred => state.deferred.push(entry),
            HandlerOutcome::Reschedule(next) => {
                info!("Replacing {} with {}", entry.event.hook_name(), next.hook_name());
                state.defer(next);
            }
        }
    }

    info!("Dispatching {}", event.hook_name());
    let outcome = handler.handle(&event).await;
    match &outcome {
        HandlerOutcome::Completed => {}
        HandlerOutcome::Deferred => {
            info!("Deferring {}", event.hook_name());
            state.defer(event);
        }
        HandlerOutcome::Reschedule(next) => {
            info!("Replacing {} with {}", event.hook_name(), next.hook_name());
            state.defer(next.clone());
        }
    }

    if let Err(e) = store.save(&state).await {
        error!(
            "Failed to persist {} deferred events to {}: {}",
            state.deferred.len(),
            store.path().display(),
            e
        );
    }

    DispatchReport {
        outcome,
        redelivered,
        pending: state.deferred.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_hooks() {
        assert_eq!(
            Event::from_dispatch("hooks/install", None).unwrap(),
            Event::Install
        );
        assert_eq!(
            Event::from_dispatch("hooks/config-changed", None).unwrap(),
            Event::ConfigChanged
        );
        assert_eq!(Event::from_dispatch("stop", None).unwrap(), Event::Stop);
        assert_eq!(
            Event::from_dispatch("hooks/influxdb2-pebble-ready", None).unwrap(),
            Event::PebbleReady {
                container: "influxdb2".to_string()
            }
        );
        assert_eq!(
            Event::from_dispatch("hooks/update-status", None).unwrap(),
            Event::Other {
                hook: "update-status".to_string()
            }
        );
    }

    #[test]
    fn test_parse_relation_changed() {
        let event =
            Event::from_dispatch("hooks/grafana-source-relation-changed", Some("grafana-source:4"))
                .unwrap();
        assert_eq!(
            event,
            Event::RelationChanged {
                relation: RelationId::new("grafana-source", 4)
            }
        );
        assert_eq!(event.hook_name(), "grafana-source-relation-changed");
    }

    #[test]
    fn test_relation_hook_needs_matching_id() {
        assert!(Event::from_dispatch("hooks/grafana-source-relation-changed", None).is_err());
        assert!(
            Event::from_dispatch("hooks/grafana-source-relation-changed", Some("ingress:1"))
                .is_err()
        );
    }

    #[test]
    fn test_empty_hook_is_rejected() {
        assert!(matches!(
            Event::from_dispatch("hooks/", None),
            Err(Error::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_defer_deduplicates() {
        let mut state = StoredState::default();
        state.defer(Event::ConfigChanged);
        state.defer(Event::ConfigChanged);
        state.defer(Event::Install);
        assert_eq!(state.deferred.len(), 2);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_string(&Event::PebbleReady {
            container: "influxdb2".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"pebble-ready","container":"influxdb2"}"#);
    }

    #[tokio::test]
    async fn test_missing_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert_eq!(store.load().await.unwrap(), StoredState::default());
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));

        let mut state = StoredState::default();
        state.defer(Event::RelationChanged {
            relation: RelationId::new("grafana-source", 2),
        });
        store.save(&state).await.unwrap();

        assert_eq!(store.load().await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_corrupt_store_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        tokio::fs::write(store.path(), r#"{"deferred": ["#).await.unwrap();

        assert_eq!(store.load().await.unwrap(), StoredState::default());
        assert!(!store.path().exists());
        assert_eq!(
            std::fs::read_to_string(store.corrupt_path()).unwrap(),
            r#"{"deferred": ["#
        );
    }

    #[test]
    fn test_start_service_is_internal() {
        let event = Event::StartService {
            service: "influxdb2".to_string(),
        };
        assert_eq!(event.hook_name(), "start-influxdb2");
        assert!(matches!(
            Event::from_dispatch("hooks/start-influxdb2", None).unwrap(),
            Event::Other { .. }
        ));
    }
}
