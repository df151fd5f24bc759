use crate::error::IncidentError;
use crate::state::{is_legal_transition, IllegalTransition, IncidentState};
use alert_schema::{Alert, AlertGroup};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const FALLBACK_PLAN_TITLE: &str = "Fallback Plan: Manual Intervention";

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RootCauseAnalysis {
    /// The failing part of the system, e.g. a node or deployment name.
    pub component: String,
    pub description: String,
    pub evidence: Vec<String>,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

impl RootCauseAnalysis {
    /// Verdict used when the reasoning engine gave nothing usable.
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self {
            component: "unknown".into(),
            description: "Root cause could not be determined automatically.".into(),
            evidence: vec![reason.into()],
            confidence: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RemediationStep {
    pub description: String,
    /// Absent for manual steps.
    #[serde(default)]
    pub command: Option<String>,
    pub expected_outcome: String,
    pub risk_level: RiskLevel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RemediationPlan {
    pub title: String,
    pub description: String,
    pub impact_assessment: String,
    pub estimated_time: String,
    pub steps: Vec<RemediationStep>,
    #[serde(default)]
    pub rollback_plan: Option<Vec<RemediationStep>>,
}

impl RemediationPlan {
    pub fn manual_intervention() -> Self {
        Self {
            title: FALLBACK_PLAN_TITLE.into(),
            description: "Automated planning failed. Manual intervention required.".into(),
            impact_assessment: "Unknown, requires human assessment".into(),
            estimated_time: "Unknown, depends on human availability".into(),
            steps: vec![RemediationStep {
                description: "Contact Kubernetes administrator for manual intervention".into(),
                command: None,
                expected_outcome: "Manual resolution of the issue".into(),
                risk_level: RiskLevel::Low,
            }],
            rollback_plan: None,
        }
    }

    pub fn is_executable(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn max_risk(&self) -> Option<RiskLevel> {
        self.steps.iter().map(|s| s.risk_level).max()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub step_index: usize,
    pub step_description: String,
    pub command: Option<String>,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

/// One alert's lifecycle from receipt to resolution.
///
/// Fields are only reachable through accessors; every mutation goes through
/// the crate-private methods below, which the orchestrator alone calls.
#[derive(Clone, Debug, Serialize)]
pub struct Incident {
    id: String,
    state: IncidentState,
    alert: AlertGroup,
    creation_time: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    root_cause_analysis: Option<RootCauseAnalysis>,
    remediation_plans: Vec<RemediationPlan>,
    approved_plan_index: Option<usize>,
    execution_results: Vec<ExecutionResult>,
    resolution_summary: Option<String>,
}

impl Incident {
    pub(crate) fn open(alert: AlertGroup) -> Result<Self, IncidentError> {
        alert_schema::validate_alert_group(&alert)?;
        let now = Utc::now();
        Ok(Self {
            id: new_incident_id(),
            state: IncidentState::Received,
            alert,
            creation_time: now,
            last_updated: now,
            root_cause_analysis: None,
            remediation_plans: Vec::new(),
            approved_plan_index: None,
            execution_results: Vec::new(),
            resolution_summary: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> IncidentState {
        self.state
    }

    pub fn alert(&self) -> &AlertGroup {
        &self.alert
    }

    pub fn primary_alert(&self) -> &Alert {
        // non-empty: checked in Incident::open
        &self.alert.alerts[0]
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn root_cause_analysis(&self) -> Option<&RootCauseAnalysis> {
        self.root_cause_analysis.as_ref()
    }

    pub fn remediation_plans(&self) -> &[RemediationPlan] {
        &self.remediation_plans
    }

    pub fn approved_plan_index(&self) -> Option<usize> {
        self.approved_plan_index
    }

    pub fn approved_plan(&self) -> Option<&RemediationPlan> {
        self.approved_plan_index
            .and_then(|i| self.remediation_plans.get(i))
    }

    pub fn execution_results(&self) -> &[ExecutionResult] {
        &self.execution_results
    }

    pub fn resolution_summary(&self) -> Option<&str> {
        self.resolution_summary.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub(crate) fn transition(&mut self, to: IncidentState) -> Result<(), IncidentError> {
        self.ensure_open()?;
        if !is_legal_transition(self.state, to) {
            return Err(IllegalTransition::between(self.state, to).into());
        }
        self.state = to;
        self.last_updated = Utc::now();
        Ok(())
    }

    pub(crate) fn record_analysis(
        &mut self,
        analysis: RootCauseAnalysis,
    ) -> Result<(), IncidentError> {
        self.ensure_open()?;
        if self.root_cause_analysis.is_some() {
            return Err(IncidentError::AnalysisAlreadyRecorded(self.id.clone()));
        }
        self.root_cause_analysis = Some(analysis);
        Ok(())
    }

    /// A fresh plan list invalidates any earlier approval.
    pub(crate) fn replace_plans(
        &mut self,
        plans: Vec<RemediationPlan>,
    ) -> Result<(), IncidentError> {
        self.ensure_open()?;
        self.remediation_plans = plans;
        self.approved_plan_index = None;
        Ok(())
    }

    pub(crate) fn approve_plan(&mut self, index: usize) -> Result<(), IncidentError> {
        self.ensure_open()?;
        if index >= self.remediation_plans.len() {
            return Err(IncidentError::PlanIndexOutOfRange {
                index,
                available: self.remediation_plans.len(),
            });
        }
        self.approved_plan_index = Some(index);
        Ok(())
    }

    pub(crate) fn append_results(
        &mut self,
        results: impl IntoIterator<Item = ExecutionResult>,
    ) -> Result<(), IncidentError> {
        self.ensure_open()?;
        self.execution_results.extend(results);
        Ok(())
    }

    pub(crate) fn finalize(
        &mut self,
        to: IncidentState,
        summary: String,
    ) -> Result<(), IncidentError> {
        if !to.is_terminal() {
            return Err(IllegalTransition::between(self.state, to).into());
        }
        self.transition(to)?;
        self.resolution_summary = Some(summary);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), IncidentError> {
        if self.is_terminal() {
            return Err(IncidentError::Terminal(self.id.clone()));
        }
        Ok(())
    }
}

fn new_incident_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("INC-{}", &hex[..8])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn node_not_ready_alert() -> AlertGroup {
        alert_schema::parse_alert_group(&serde_json::json!({
            "receiver": "incident-pipeline",
            "status": "firing",
            "alerts": [{
                "status": "firing",
                "labels": {
                    "alertname": "KubeNodeNotReady",
                    "severity": "critical",
                    "node": "worker-node-1"
                },
                "annotations": {
                    "summary": "Node worker-node-1 is not ready",
                    "description": "worker-node-1 has been unready for more than 15 minutes."
                },
                "startsAt": "2024-05-01T10:00:00Z",
                "generatorURL": "http://prometheus/graph"
            }]
        }))
        .expect("fixture alert")
    }

    pub(crate) fn step(description: &str, command: Option<&str>) -> RemediationStep {
        RemediationStep {
            description: description.into(),
            command: command.map(Into::into),
            expected_outcome: "ok".into(),
            risk_level: RiskLevel::Medium,
        }
    }

    pub(crate) fn plan(title: &str, steps: Vec<RemediationStep>) -> RemediationPlan {
        RemediationPlan {
            title: title.into(),
            description: "d".into(),
            impact_assessment: "i".into(),
            estimated_time: "5 minutes".into(),
            steps,
            rollback_plan: None,
        }
    }

    #[test]
    fn open_sets_received_and_matching_timestamps() {
        let incident = Incident::open(node_not_ready_alert()).expect("open");
        assert_eq!(incident.state(), IncidentState::Received);
        assert_eq!(incident.creation_time(), incident.last_updated());
        assert!(incident.id().starts_with("INC-"));
        assert_eq!(incident.id().len(), 12);
    }

    #[test]
    fn ids_are_unique() {
        let a = Incident::open(node_not_ready_alert()).expect("open");
        let b = Incident::open(node_not_ready_alert()).expect("open");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn analysis_is_recorded_once() {
        let mut incident = Incident::open(node_not_ready_alert()).expect("open");
        incident
            .record_analysis(RootCauseAnalysis::unknown("x"))
            .expect("first");
        assert!(matches!(
            incident.record_analysis(RootCauseAnalysis::unknown("y")),
            Err(IncidentError::AnalysisAlreadyRecorded(_))
        ));
    }

    #[test]
    fn approval_index_must_be_in_range() {
        let mut incident = Incident::open(node_not_ready_alert()).expect("open");
        incident
            .replace_plans(vec![RemediationPlan::manual_intervention()])
            .expect("plans");
        assert!(incident.approve_plan(1).is_err());
        incident.approve_plan(0).expect("approve");
        assert_eq!(
            incident.approved_plan().map(|p| p.title.as_str()),
            Some(FALLBACK_PLAN_TITLE)
        );
    }

    #[test]
    fn replacing_plans_clears_approval() {
        let mut incident = Incident::open(node_not_ready_alert()).expect("open");
        incident
            .replace_plans(vec![RemediationPlan::manual_intervention()])
            .expect("plans");
        incident.approve_plan(0).expect("approve");
        incident
            .replace_plans(vec![plan("second", vec![step("a", None)])])
            .expect("plans");
        assert_eq!(incident.approved_plan_index(), None);
    }

    #[test]
    fn terminal_incident_rejects_mutation() {
        let mut incident = Incident::open(node_not_ready_alert()).expect("open");
        for state in [
            IncidentState::Investigating,
            IncidentState::Analyzed,
            IncidentState::Planning,
            IncidentState::ApprovalPending,
            IncidentState::Executing,
        ] {
            incident.transition(state).expect("legal");
        }
        incident
            .finalize(IncidentState::Resolved, "done".into())
            .expect("finalize");
        assert!(matches!(
            incident.append_results(Vec::new()),
            Err(IncidentError::Terminal(_))
        ));
        assert!(incident.transition(IncidentState::Failed).is_err());
        assert_eq!(incident.resolution_summary(), Some("done"));
    }

    #[test]
    fn skipping_approval_is_illegal() {
        let mut incident = Incident::open(node_not_ready_alert()).expect("open");
        incident.transition(IncidentState::Investigating).expect("legal");
        incident.transition(IncidentState::Analyzed).expect("legal");
        incident.transition(IncidentState::Planning).expect("legal");
        assert!(matches!(
            incident.transition(IncidentState::Executing),
            Err(IncidentError::IllegalTransition(_))
        ));
        assert_eq!(incident.state(), IncidentState::Planning);
    }

    #[test]
    fn max_risk_is_highest_step_risk() {
        let mut p = plan("p", vec![step("a", None), step("b", None)]);
        p.steps[1].risk_level = RiskLevel::High;
        assert_eq!(p.max_risk(), Some(RiskLevel::High));
        assert_eq!(plan("empty", Vec::new()).max_risk(), None);
    }
}
