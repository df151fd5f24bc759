use crate::error::StageOutcome;
use crate::llm::{strip_code_fences, ReasoningEngine, ReasoningPrompt};
use crate::model::{Incident, RemediationPlan};
use crate::prompts::{response_schema, PLANNER_PREAMBLE};
use serde::Deserialize;
use std::sync::Arc;

pub const MAX_PLANS: usize = 2;

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanReply {
    Many(Vec<RemediationPlan>),
    One(RemediationPlan),
}

pub struct PlanGenerator {
    engine: Arc<dyn ReasoningEngine>,
}

impl PlanGenerator {
    pub fn new(engine: Arc<dyn ReasoningEngine>) -> Self {
        Self { engine }
    }

    /// One or two candidate plans, never empty. Without a root cause, or
    /// without a usable reply, the single manual-intervention plan is returned.
    pub async fn generate(
        &self,
        incident: &Incident,
        feedback: Option<&str>,
    ) -> StageOutcome<Vec<RemediationPlan>> {
        let Some(analysis) = incident.root_cause_analysis() else {
            return fallback("no root cause analysis recorded".into());
        };

        let alert = incident.primary_alert();
        let mut user = format!(
            "Incident: {}\nAlert: {} ({})\nSummary: {}\n\nRoot cause:\n{}\n",
            incident.id(),
            alert.labels.alertname,
            alert.labels.severity.as_str(),
            alert.annotations.summary,
            serde_json::to_string_pretty(analysis).unwrap_or_default(),
        );
        if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
            user.push_str(&format!("\nFEEDBACK FROM PREVIOUS PLAN: {feedback}\n"));
        }
        user.push_str(&format!(
            "\nPropose 1 to {MAX_PLANS} remediation plans as a JSON array. \
             Each element must match this schema:\n{}",
            response_schema::<RemediationPlan>()
        ));

        let prompt = ReasoningPrompt::new(PLANNER_PREAMBLE, user);
        let raw = match self.engine.complete(&prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(incident = incident.id(), %err, "planning fallback");
                return fallback(format!("reasoning engine unavailable: {err}"));
            }
        };

        let plans = match serde_json::from_str::<PlanReply>(strip_code_fences(&raw)) {
            Ok(PlanReply::Many(plans)) => plans,
            Ok(PlanReply::One(plan)) => vec![plan],
            Err(err) => {
                tracing::warn!(incident = incident.id(), %err, "planning fallback");
                return fallback(format!("plan response could not be parsed: {err}"));
            }
        };

        let received = plans.len();
        let mut plans: Vec<_> = plans.into_iter().filter(|p| p.is_executable()).collect();
        if plans.len() < received {
            tracing::debug!(
                incident = incident.id(),
                dropped = received - plans.len(),
                "dropped plans without steps"
            );
        }
        if plans.is_empty() {
            return fallback("no plan with at least one step was proposed".into());
        }
        plans.truncate(MAX_PLANS);
        StageOutcome::Produced(plans)
    }
}

fn fallback(reason: String) -> StageOutcome<Vec<RemediationPlan>> {
    StageOutcome::Fallback {
        value: vec![RemediationPlan::manual_intervention()],
        reason,
    }
}
