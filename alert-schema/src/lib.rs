use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Info => "info",
        }
    }
}

/// Labels attached to a single Alertmanager alert.
///
/// The well-known Kubernetes labels are typed; anything else the rule
/// attached is preserved in `extra`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertLabels {
    pub alertname: String,
    pub severity: AlertSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertAnnotations {
    pub summary: String,
    pub description: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub status: AlertStatus,
    pub labels: AlertLabels,
    pub annotations: AlertAnnotations,
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
    #[serde(rename = "endsAt", default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "generatorURL", default)]
    pub generator_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// An Alertmanager webhook payload: one or more alerts grouped by route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertGroup {
    #[serde(default)]
    pub receiver: String,
    pub status: AlertStatus,
    pub alerts: Vec<Alert>,
    #[serde(rename = "groupLabels", default)]
    pub group_labels: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("malformed alert payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("alert group contains no alerts")]
    NoAlerts,
    #[error("alerts[{index}]: {field} is required")]
    MissingField { index: usize, field: &'static str },
}

pub fn parse_alert_group(payload: &serde_json::Value) -> Result<AlertGroup, SchemaError> {
    let group = AlertGroup::deserialize(payload)?;
    validate_alert_group(&group)?;
    Ok(group)
}

pub fn validate_alert_group(group: &AlertGroup) -> Result<(), SchemaError> {
    if group.alerts.is_empty() {
        return Err(SchemaError::NoAlerts);
    }
    for (index, alert) in group.alerts.iter().enumerate() {
        if alert.labels.alertname.trim().is_empty() {
            return Err(SchemaError::MissingField {
                index,
                field: "labels.alertname",
            });
        }
        if alert.annotations.summary.trim().is_empty() {
            return Err(SchemaError::MissingField {
                index,
                field: "annotations.summary",
            });
        }
        if alert.annotations.description.trim().is_empty() {
            return Err(SchemaError::MissingField {
                index,
                field: "annotations.description",
            });
        }
    }
    Ok(())
}
