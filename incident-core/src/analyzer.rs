use crate::error::StageOutcome;
use crate::evidence::Evidence;
use crate::llm::{parse_structured, ReasoningEngine, ReasoningPrompt};
use crate::model::{Incident, RootCauseAnalysis};
use crate::prompts::{response_schema, ANALYST_PREAMBLE};
use std::fmt::Write;
use std::sync::Arc;

pub struct RootCauseAnalyzer {
    engine: Arc<dyn ReasoningEngine>,
}

impl RootCauseAnalyzer {
    pub fn new(engine: Arc<dyn ReasoningEngine>) -> Self {
        Self { engine }
    }

    /// Always yields a verdict. Engine failures and unusable replies come back
    /// as a zero-confidence `unknown` analysis.
    pub async fn analyze(
        &self,
        incident: &Incident,
        evidence: &Evidence,
    ) -> StageOutcome<RootCauseAnalysis> {
        let prompt = ReasoningPrompt::new(ANALYST_PREAMBLE, analysis_prompt(incident, evidence));

        let raw = match self.engine.complete(&prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                let reason = format!("reasoning engine unavailable: {err}");
                tracing::warn!(incident = incident.id(), %reason, "analysis fallback");
                return fallback(reason);
            }
        };

        match parse_structured::<RootCauseAnalysis>(&raw)
            .map_err(|e| e.to_string())
            .and_then(validate)
        {
            Ok(analysis) => StageOutcome::Produced(analysis),
            Err(err) => {
                let reason = format!("analysis response could not be parsed: {err}");
                tracing::warn!(incident = incident.id(), %reason, "analysis fallback");
                fallback(reason)
            }
        }
    }
}

fn fallback(reason: String) -> StageOutcome<RootCauseAnalysis> {
    StageOutcome::Fallback {
        value: RootCauseAnalysis::unknown(reason.clone()),
        reason,
    }
}

fn validate(analysis: RootCauseAnalysis) -> Result<RootCauseAnalysis, String> {
    if analysis.component.trim().is_empty() {
        return Err("empty component".into());
    }
    if !(0.0..=1.0).contains(&analysis.confidence) {
        return Err(format!("confidence {} outside [0, 1]", analysis.confidence));
    }
    Ok(analysis)
}

/// Same incident and evidence always render to the same text.
pub fn describe_incident(incident: &Incident, evidence: &Evidence) -> String {
    let alert = incident.primary_alert();
    let labels = &alert.labels;
    let mut out = String::new();

    let _ = writeln!(out, "Incident: {}", incident.id());
    let _ = writeln!(out, "Alert: {}", labels.alertname);
    let _ = writeln!(out, "Severity: {}", labels.severity.as_str());
    let _ = writeln!(out, "Started: {}", alert.starts_at.to_rfc3339());
    let _ = writeln!(out, "Summary: {}", alert.annotations.summary);
    let _ = writeln!(out, "Description: {}", alert.annotations.description);

    let scoped = [
        ("node", &labels.node),
        ("namespace", &labels.namespace),
        ("pod", &labels.pod),
        ("container", &labels.container),
        ("service", &labels.service),
        ("deployment", &labels.deployment),
    ];
    for (name, value) in scoped {
        if let Some(value) = value {
            let _ = writeln!(out, "Label {name}: {value}");
        }
    }
    for (name, value) in &labels.extra {
        let _ = writeln!(out, "Label {name}: {value}");
    }

    if evidence.is_empty() {
        out.push_str("\nNo evidence could be collected.\n");
    } else {
        out.push_str("\nEvidence:\n");
        for (category, payload) in evidence {
            let body = serde_json::to_string_pretty(payload).unwrap_or_default();
            let _ = writeln!(out, "## {category}\n{body}");
        }
    }
    out
}

fn analysis_prompt(incident: &Incident, evidence: &Evidence) -> String {
    format!(
        "{}\nRespond with a single JSON object matching this schema:\n{}",
        describe_incident(incident, evidence),
        response_schema::<RootCauseAnalysis>()
    )
}
