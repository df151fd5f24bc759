use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    IncidentCreated,
    StateChanged,
    AnalysisRecorded,
    PlansProposed,
    ApprovalRequested,
    ApprovalDecided,
    StepExecuted,
    Resolved,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: Option<i64>,
    pub incident_id: String,
    pub event_type: EventType,
    pub description: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: String,
}

impl Event {
    pub fn now(
        incident_id: &str,
        event_type: EventType,
        description: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: None,
            incident_id: incident_id.to_string(),
            event_type,
            description: description.into(),
            details,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("event log io: {0}")]
    Io(#[from] std::io::Error),
    #[error("event log sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("event log encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only audit trail of incident activity, one sqlite row per event.
#[derive(Clone)]
pub struct EventLog {
    db_path: Arc<PathBuf>,
}

impl EventLog {
    pub fn open(path: &str) -> Result<Self, LogError> {
        let db_path = PathBuf::from(path);
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                incident_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                description TEXT NOT NULL,
                details TEXT,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_incident ON events(incident_id);
            CREATE INDEX IF NOT EXISTS idx_events_ts ON events(timestamp);
            ",
        )?;

        Ok(Self {
            db_path: Arc::new(db_path),
        })
    }

    pub fn append(&self, event: &Event) -> Result<i64, LogError> {
        let conn = Connection::open(&*self.db_path)?;
        let event_type = serde_json::to_string(&event.event_type)?;
        let details = event
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            "INSERT INTO events (incident_id, event_type, description, details, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.incident_id,
                event_type,
                event.description,
                details,
                event.timestamp,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub fn events_for_incident(&self, incident_id: &str) -> Result<Vec<Event>, LogError> {
        let conn = Connection::open(&*self.db_path)?;
        let mut stmt = conn.prepare(
            "SELECT id, incident_id, event_type, description, details, timestamp
             FROM events
             WHERE incident_id = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![incident_id], map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn events_after(&self, after_id: i64) -> Result<Vec<Event>, LogError> {
        let conn = Connection::open(&*self.db_path)?;
        let mut stmt = conn.prepare(
            "SELECT id, incident_id, event_type, description, details, timestamp
             FROM events
             WHERE id > ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![after_id], map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Incidents with no `Resolved` or `Failed` event yet.
    pub fn active_incidents(&self) -> Result<Vec<String>, LogError> {
        let conn = Connection::open(&*self.db_path)?;

        let mut stmt = conn.prepare("SELECT DISTINCT incident_id FROM events")?;
        let all = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT DISTINCT incident_id FROM events
             WHERE event_type IN (?1, ?2)",
        )?;
        let resolved_type = serde_json::to_string(&EventType::Resolved)?;
        let failed_type = serde_json::to_string(&EventType::Failed)?;
        let closed = stmt
            .query_map(params![resolved_type, failed_type], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(all.difference(&closed).cloned().collect())
    }

    /// Every incident id, most recently active first.
    pub fn all_incidents(&self) -> Result<Vec<String>, LogError> {
        let conn = Connection::open(&*self.db_path)?;
        let mut stmt = conn.prepare(
            "SELECT incident_id
             FROM events
             GROUP BY incident_id
             ORDER BY MAX(id) DESC",
        )?;

        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let event_type_str: String = row.get(2)?;
    let details_str: Option<String> = row.get(4)?;

    let event_type: EventType = serde_json::from_str(&event_type_str).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(err))
    })?;

    let details = details_str
        .map(|s| {
            serde_json::from_str(&s).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })
        })
        .transpose()?;

    Ok(Event {
        id: row.get(0)?,
        incident_id: row.get(1)?,
        event_type,
        description: row.get(3)?,
        details,
        timestamp: row.get(5)?,
    })
}
