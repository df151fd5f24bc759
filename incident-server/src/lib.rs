pub mod approvals;
pub mod webhook;

use axum::Router;
use incident_core::event_log::EventLog;
use incident_core::{Incident, IncidentObserver, Orchestrator};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

struct Entry {
    incident: Incident,
    closed_at: Option<Instant>,
}

/// Latest known snapshot of every incident this process has opened.
///
/// Resolved and failed incidents are dropped once they have been closed for
/// longer than the retention window. Locks are never held across an await.
#[derive(Clone)]
pub struct IncidentTable {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    retention: Duration,
}

impl IncidentTable {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Arc::default(),
            retention,
        }
    }

    pub fn get(&self, id: &str) -> Option<Incident> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(id).map(|entry| entry.incident.clone())
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn upsert(&self, incident: &Incident) {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| {
            entry
                .closed_at
                .map_or(true, |closed| now.duration_since(closed) < self.retention)
        });
        entries.insert(
            incident.id().to_string(),
            Entry {
                incident: incident.clone(),
                closed_at: incident.is_terminal().then_some(now),
            },
        );
    }
}

impl IncidentObserver for IncidentTable {
    fn incident_updated(&self, incident: &Incident) {
        self.upsert(incident);
    }
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub incidents: IncidentTable,
    pub log: Option<EventLog>,
}

impl AppState {
    /// Wires the snapshot table into the orchestrator so every state change
    /// is visible to readers while the pipeline is still running.
    pub fn new(orchestrator: Orchestrator, log: Option<EventLog>, retention: Duration) -> Self {
        let incidents = IncidentTable::new(retention);
        let orchestrator = orchestrator.with_observer(Arc::new(incidents.clone()));
        Self {
            orchestrator: Arc::new(orchestrator),
            incidents,
            log,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(webhook::webhook_router())
        .merge(approvals::approvals_router())
        .with_state(state)
}
