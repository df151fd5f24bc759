use crate::error::IncidentError;
use crate::llm::{ReasoningEngine, ReasoningPrompt};
use crate::model::{ExecutionResult, Incident, RemediationStep};
use crate::prompts::SUMMARY_PREAMBLE;
use crate::runner::{RunnerError, StepRunner};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

const READY_JSONPATH: &str = "{.status.conditions[?(@.type==\"Ready\")].status}";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub resolved: bool,
    pub detail: String,
}

/// Checks whether the alert condition has cleared after remediation.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, incident: &Incident) -> Verification;
}

/// Asks the cluster. Only node readiness has a dedicated check; other alert
/// types are assumed cleared once every step succeeded.
pub struct ClusterVerifier {
    runner: Arc<dyn StepRunner>,
    timeout: Duration,
}

impl ClusterVerifier {
    pub fn new(runner: Arc<dyn StepRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }
}

#[async_trait]
impl Verifier for ClusterVerifier {
    async fn verify(&self, incident: &Incident) -> Verification {
        let labels = &incident.primary_alert().labels;
        let (Some(node), "KubeNodeNotReady") = (&labels.node, labels.alertname.as_str()) else {
            return Verification {
                resolved: true,
                detail: format!("no dedicated check for {}", labels.alertname),
            };
        };

        let node = match shlex::try_quote(node) {
            Ok(quoted) => quoted,
            Err(err) => {
                return Verification {
                    resolved: false,
                    detail: format!("cannot check node {node:?}: {err}"),
                }
            }
        };
        let command = format!("kubectl get node {node} -o jsonpath='{READY_JSONPATH}'");
        match self.runner.run(&command, self.timeout).await {
            Ok(out) if out.success && out.stdout.trim() == "True" => Verification {
                resolved: true,
                detail: format!("Node {node} is Ready"),
            },
            Ok(out) => Verification {
                resolved: false,
                detail: format!(
                    "Node {node} is not Ready (status: {})",
                    out.stderr.unwrap_or_else(|| out.stdout.trim().to_string())
                ),
            },
            Err(err) => Verification {
                resolved: false,
                detail: format!("readiness check failed: {err}"),
            },
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SimulatedVerifier;

#[async_trait]
impl Verifier for SimulatedVerifier {
    async fn verify(&self, incident: &Incident) -> Verification {
        let labels = &incident.primary_alert().labels;
        let detail = match (&labels.node, labels.alertname.as_str()) {
            (Some(node), "KubeNodeNotReady") => format!("[SIMULATED] Node {node} is now Ready"),
            _ => format!("[SIMULATED] Alert {} is no longer firing", labels.alertname),
        };
        Verification {
            resolved: true,
            detail,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub results: Vec<ExecutionResult>,
    pub success: bool,
    /// Present only when every step succeeded.
    pub verification: Option<Verification>,
    pub summary: String,
}

pub struct StepExecutor {
    runner: Arc<dyn StepRunner>,
    verifier: Arc<dyn Verifier>,
    engine: Arc<dyn ReasoningEngine>,
    step_timeout: Duration,
}

impl StepExecutor {
    pub fn new(
        runner: Arc<dyn StepRunner>,
        verifier: Arc<dyn Verifier>,
        engine: Arc<dyn ReasoningEngine>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            verifier,
            engine,
            step_timeout,
        }
    }

    /// Run the approved plan in order, stopping at the first failed step.
    /// The incident is not touched; the caller appends the results.
    pub async fn execute(&self, incident: &Incident) -> Result<ExecutionReport, IncidentError> {
        let plan = incident
            .approved_plan()
            .ok_or_else(|| IncidentError::NoApprovedPlan(incident.id().to_string()))?;

        let results = self.run_steps(incident.id(), &plan.steps).await;
        let all_succeeded = results.len() == plan.steps.len() && results.iter().all(|r| r.success);

        let verification = if all_succeeded {
            Some(self.verifier.verify(incident).await)
        } else {
            None
        };
        let success = verification.as_ref().is_some_and(|v| v.resolved);
        let summary = self
            .summarize(incident, &results, verification.as_ref(), success)
            .await;

        tracing::info!(
            incident = incident.id(),
            steps = results.len(),
            success,
            "plan execution finished"
        );
        Ok(ExecutionReport {
            results,
            success,
            verification,
            summary,
        })
    }

    /// Run the approved plan's rollback steps. Never invoked automatically;
    /// rolling back is a separate, deliberate action.
    pub async fn rollback(
        &self,
        incident: &Incident,
    ) -> Result<Vec<ExecutionResult>, IncidentError> {
        let plan = incident
            .approved_plan()
            .ok_or_else(|| IncidentError::NoApprovedPlan(incident.id().to_string()))?;
        let Some(steps) = &plan.rollback_plan else {
            return Ok(Vec::new());
        };
        tracing::info!(
            incident = incident.id(),
            steps = steps.len(),
            "rolling back"
        );
        Ok(self.run_steps(incident.id(), steps).await)
    }

    async fn run_steps(
        &self,
        incident_id: &str,
        steps: &[RemediationStep],
    ) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let result = self.run_step(index, step).await;
            let failed = !result.success;
            if failed {
                tracing::warn!(
                    incident = incident_id,
                    step = index,
                    error = result.error.as_deref().unwrap_or(""),
                    "step failed"
                );
            } else {
                tracing::debug!(incident = incident_id, step = index, "step succeeded");
            }
            results.push(result);
            if failed {
                break;
            }
        }
        results
    }

    async fn run_step(&self, index: usize, step: &RemediationStep) -> ExecutionResult {
        let mut result = ExecutionResult {
            step_index: index,
            step_description: step.description.clone(),
            command: step.command.clone(),
            success: true,
            output: String::new(),
            error: None,
        };

        let Some(command) = &step.command else {
            result.output = "No command to execute - marked as completed".into();
            return result;
        };

        match self.runner.run(command, self.step_timeout).await {
            Ok(out) => {
                result.success = out.success;
                result.output = out.stdout;
                result.error = match (out.success, out.stderr) {
                    (true, _) => None,
                    (false, Some(stderr)) => Some(stderr),
                    (false, None) => Some("command exited unsuccessfully".into()),
                };
            }
            Err(RunnerError::Timeout { seconds }) => {
                result.success = false;
                result.error = Some(format!("Command timed out after {seconds} seconds"));
            }
            Err(err) => {
                result.success = false;
                result.error = Some(format!("Error executing command: {err}"));
            }
        }
        result
    }

    async fn summarize(
        &self,
        incident: &Incident,
        results: &[ExecutionResult],
        verification: Option<&Verification>,
        success: bool,
    ) -> String {
        let trace = execution_trace(results, verification);
        let prompt = ReasoningPrompt::new(
            SUMMARY_PREAMBLE,
            format!(
                "Summarize the remediation of incident {} ({}).\n\n{trace}",
                incident.id(),
                incident.primary_alert().labels.alertname
            ),
        );
        match self.engine.complete(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => default_summary(results, verification, success),
            Err(err) => {
                tracing::debug!(incident = incident.id(), %err, "using default execution summary");
                default_summary(results, verification, success)
            }
        }
    }
}

fn execution_trace(results: &[ExecutionResult], verification: Option<&Verification>) -> String {
    let mut out = String::new();
    for r in results {
        let status = if r.success { "SUCCESS" } else { "FAILED" };
        let _ = writeln!(
            out,
            "Step {}: {} [{status}]",
            r.step_index + 1,
            r.step_description
        );
        if let Some(command) = &r.command {
            let _ = writeln!(out, "  command: {command}");
        }
        if !r.output.is_empty() {
            let _ = writeln!(out, "  output: {}", r.output.trim());
        }
        if let Some(error) = &r.error {
            let _ = writeln!(out, "  error: {error}");
        }
    }
    match verification {
        Some(v) => {
            let _ = writeln!(out, "Verification: {} ({})", v.resolved, v.detail);
        }
        None => out.push_str("Verification: skipped\n"),
    }
    out
}

fn default_summary(
    results: &[ExecutionResult],
    verification: Option<&Verification>,
    success: bool,
) -> String {
    let succeeded = results.iter().filter(|r| r.success).count();
    let mut summary = format!(
        "Executed {} step(s), {succeeded} succeeded. ",
        results.len()
    );
    if let Some(failed) = results.iter().find(|r| !r.success) {
        let _ = write!(
            summary,
            "Step {} failed: {}. ",
            failed.step_index + 1,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }
    if let Some(v) = verification {
        let _ = write!(summary, "{}. ", v.detail);
    }
    summary.push_str(if success {
        "Incident resolved."
    } else {
        "Incident not resolved."
    });
    summary
}
