//! Drives one incident from receipt to a terminal state.
//!
//! Stages run strictly one after another. After each one returns, its
//! completed-work [`Signal`] goes through [`next_action`] and the orchestrator
//! applies the answer. Nothing else moves an incident between states.

use crate::analyzer::RootCauseAnalyzer;
use crate::approval::{
    ApprovalChannel, ApprovalGate, ApprovalOutcome, ApprovalStore, LogApprovalChannel,
    WebhookApprovalChannel,
};
use crate::config::{ApprovalTimeoutPolicy, PipelineConfig};
use crate::error::IncidentError;
use crate::event_log::{Event, EventLog, EventType};
use crate::evidence::{EvidenceCollector, EvidenceSource, KubectlEvidence, StaticEvidence};
use crate::executor::{ClusterVerifier, SimulatedVerifier, StepExecutor, Verifier};
use crate::llm::ReasoningEngine;
use crate::model::{Incident, RootCauseAnalysis};
use crate::planner::PlanGenerator;
use crate::runner::{ShellStepRunner, SimulatedStepRunner, StepRunner};
use crate::state::{next_action, Action, IncidentState, Signal, Transition};
use serde_json::{json, Value};
use std::sync::Arc;

/// External collaborators the pipeline talks to.
#[derive(Clone)]
pub struct Capabilities {
    pub engine: Arc<dyn ReasoningEngine>,
    pub evidence: Arc<dyn EvidenceSource>,
    pub runner: Arc<dyn StepRunner>,
    pub verifier: Arc<dyn Verifier>,
    pub channel: Arc<dyn ApprovalChannel>,
}

impl Capabilities {
    /// Live cluster access when `execute_commands` is set, simulation otherwise.
    pub fn from_config(config: &PipelineConfig, engine: Arc<dyn ReasoningEngine>) -> Self {
        let channel: Arc<dyn ApprovalChannel> = match &config.approval_webhook_url {
            Some(url) => Arc::new(WebhookApprovalChannel::new(url.clone())),
            None => Arc::new(LogApprovalChannel),
        };

        if config.execute_commands {
            let runner: Arc<dyn StepRunner> = Arc::new(ShellStepRunner);
            Self {
                engine,
                evidence: Arc::new(KubectlEvidence::new(runner.clone(), config.step_timeout())),
                verifier: Arc::new(ClusterVerifier::new(runner.clone(), config.step_timeout())),
                runner,
                channel,
            }
        } else {
            Self {
                engine,
                evidence: Arc::new(StaticEvidence),
                runner: Arc::new(SimulatedStepRunner),
                verifier: Arc::new(SimulatedVerifier),
                channel,
            }
        }
    }
}

/// Sees a copy of the incident whenever it is opened or changes state.
pub trait IncidentObserver: Send + Sync {
    fn incident_updated(&self, incident: &Incident);
}

pub struct Orchestrator {
    collector: EvidenceCollector,
    analyzer: RootCauseAnalyzer,
    planner: PlanGenerator,
    gate: ApprovalGate,
    executor: StepExecutor,
    max_replan_attempts: usize,
    timeout_policy: ApprovalTimeoutPolicy,
    log: Option<EventLog>,
    observer: Option<Arc<dyn IncidentObserver>>,
}

/// Stage output held between producing a signal and applying its action.
#[derive(Default)]
struct Staged {
    analysis: Option<RootCauseAnalysis>,
    summary: Option<String>,
    replans: usize,
}

impl Orchestrator {
    pub fn new(caps: Capabilities, config: &PipelineConfig, approvals: ApprovalStore) -> Self {
        Self {
            collector: EvidenceCollector::new(caps.evidence),
            analyzer: RootCauseAnalyzer::new(caps.engine.clone()),
            planner: PlanGenerator::new(caps.engine.clone()),
            gate: ApprovalGate::new(
                approvals,
                caps.channel,
                caps.engine.clone(),
                config.approval_timeout(),
            ),
            executor: StepExecutor::new(
                caps.runner,
                caps.verifier,
                caps.engine,
                config.step_timeout(),
            ),
            max_replan_attempts: config.max_replan_attempts,
            timeout_policy: config.approval_timeout_policy,
            log: None,
            observer: None,
        }
    }

    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn IncidentObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn approvals(&self) -> &ApprovalStore {
        self.gate.store()
    }

    pub fn executor(&self) -> &StepExecutor {
        &self.executor
    }

    /// Validate an Alertmanager payload and open an incident for it.
    pub fn create_incident(&self, payload: &Value) -> Result<Incident, IncidentError> {
        let group = alert_schema::parse_alert_group(payload)?;
        let incident = Incident::open(group)?;
        let labels = &incident.primary_alert().labels;
        tracing::info!(
            incident = incident.id(),
            alert = %labels.alertname,
            severity = labels.severity.as_str(),
            "incident created"
        );
        self.record(
            &incident,
            EventType::IncidentCreated,
            format!("incident created for {}", labels.alertname),
            Some(json!({
                "alertname": labels.alertname,
                "severity": labels.severity,
                "alert_count": incident.alert().alerts.len(),
            })),
        );
        self.notify(&incident);
        Ok(incident)
    }

    /// Create an incident and run it to completion.
    pub async fn handle_alert(&self, payload: &Value) -> Result<Incident, IncidentError> {
        let mut incident = self.create_incident(payload)?;
        self.run(&mut incident).await?;
        Ok(incident)
    }

    /// Run until the incident is resolved or failed. An error leaves the
    /// incident in the last state it legally reached.
    pub async fn run(&self, incident: &mut Incident) -> Result<(), IncidentError> {
        let mut staged = Staged::default();
        let mut signal = Signal::Dispatch;

        while !incident.is_terminal() {
            let Transition { action, next } = next_action(incident.state(), &signal)?;
            signal = match action {
                Action::Investigate => {
                    self.advance(incident, next)?;
                    let evidence = self.collector.collect(incident).await;
                    let outcome = self.analyzer.analyze(incident, &evidence).await;
                    if let Some(reason) = outcome.fallback_reason() {
                        tracing::warn!(incident = incident.id(), reason, "analysis fell back");
                    }
                    staged.analysis = Some(outcome.into_value());
                    Signal::AnalysisReturned
                }
                Action::RecordAnalysis => {
                    let analysis = staged
                        .analysis
                        .take()
                        .ok_or(IncidentError::MissingStageResult("analysis"))?;
                    self.record(
                        incident,
                        EventType::AnalysisRecorded,
                        format!("root cause: {}", analysis.component),
                        serde_json::to_value(&analysis).ok(),
                    );
                    incident.record_analysis(analysis)?;
                    self.advance(incident, next)?;
                    Signal::Dispatch
                }
                Action::Plan { feedback } => {
                    self.advance(incident, next)?;
                    let outcome = self.planner.generate(incident, feedback.as_deref()).await;
                    if let Some(reason) = outcome.fallback_reason() {
                        tracing::warn!(incident = incident.id(), reason, "planning fell back");
                    }
                    let plans = outcome.into_value();
                    self.record(
                        incident,
                        EventType::PlansProposed,
                        format!("{} plan(s) proposed", plans.len()),
                        Some(json!({
                            "titles": plans.iter().map(|p| p.title.as_str()).collect::<Vec<_>>(),
                            "feedback": feedback,
                        })),
                    );
                    incident.replace_plans(plans)?;
                    Signal::PlansReturned
                }
                Action::RequestApproval => {
                    // Publish first: a failed notification leaves the incident in Planning.
                    let request = self.gate.submit(incident).await?;
                    self.record(
                        incident,
                        EventType::ApprovalRequested,
                        format!("approval requested ({} plans)", request.plans.len()),
                        Some(json!({ "approval_id": request.id })),
                    );
                    self.advance(incident, next)?;

                    let outcome = self.gate.wait(&request).await?;
                    self.record(
                        incident,
                        EventType::ApprovalDecided,
                        "approval decided",
                        serde_json::to_value(&outcome).ok(),
                    );
                    self.interpret(incident, outcome, &mut staged.replans)
                }
                Action::Execute { plan_index } => {
                    incident.approve_plan(plan_index)?;
                    self.advance(incident, next)?;
                    let report = self.executor.execute(incident).await?;
                    for result in &report.results {
                        self.record(
                            incident,
                            EventType::StepExecuted,
                            format!(
                                "step {} {}",
                                result.step_index + 1,
                                if result.success { "succeeded" } else { "failed" }
                            ),
                            serde_json::to_value(result).ok(),
                        );
                    }
                    incident.append_results(report.results)?;
                    staged.summary = Some(report.summary);
                    Signal::ExecutionComplete {
                        success: report.success,
                    }
                }
                Action::Finalize { summary } => {
                    let summary = summary
                        .or_else(|| staged.summary.take())
                        .unwrap_or_else(|| format!("Incident {} closed as {next}", incident.id()));
                    self.finalize(incident, next, summary)?;
                    Signal::Dispatch
                }
            };
        }
        Ok(())
    }

    fn interpret(
        &self,
        incident: &Incident,
        outcome: ApprovalOutcome,
        replans: &mut usize,
    ) -> Signal {
        match outcome {
            ApprovalOutcome::Approved {
                plan_index,
                approver,
                ..
            } => match incident.remediation_plans().get(plan_index) {
                Some(plan) if plan.is_executable() => {
                    tracing::info!(
                        incident = incident.id(),
                        plan_index,
                        %approver,
                        "plan approved"
                    );
                    Signal::Approved { plan_index }
                }
                Some(_) => self.replan_or_abandon(
                    replans,
                    format!("approved plan #{} has no steps", plan_index + 1),
                ),
                None => self.replan_or_abandon(
                    replans,
                    format!(
                        "approved plan #{} does not exist ({} proposed)",
                        plan_index + 1,
                        incident.remediation_plans().len()
                    ),
                ),
            },
            ApprovalOutcome::Rejected { approver, feedback } => {
                tracing::info!(incident = incident.id(), %approver, "plan rejected");
                self.replan_or_abandon(replans, feedback.unwrap_or_default())
            }
            ApprovalOutcome::TimedOut => match self.timeout_policy {
                ApprovalTimeoutPolicy::Abort => Signal::Abandoned {
                    reason: "approval timed out".into(),
                },
                ApprovalTimeoutPolicy::Replan => self.replan_or_abandon(
                    replans,
                    "no decision before the approval timeout".into(),
                ),
            },
        }
    }

    fn replan_or_abandon(&self, replans: &mut usize, feedback: String) -> Signal {
        *replans += 1;
        if *replans > self.max_replan_attempts {
            return Signal::Abandoned {
                reason: format!(
                    "no plan approved after {} attempts; last feedback: {feedback}",
                    *replans
                ),
            };
        }
        Signal::Rejected { feedback }
    }

    fn advance(&self, incident: &mut Incident, next: IncidentState) -> Result<(), IncidentError> {
        let from = incident.state();
        incident.transition(next)?;
        tracing::info!(incident = incident.id(), %from, to = %next, "state changed");
        self.record(
            incident,
            EventType::StateChanged,
            format!("{from} -> {next}"),
            Some(json!({ "from": from, "to": next })),
        );
        self.notify(incident);
        Ok(())
    }

    fn finalize(
        &self,
        incident: &mut Incident,
        next: IncidentState,
        summary: String,
    ) -> Result<(), IncidentError> {
        let from = incident.state();
        incident.finalize(next, summary)?;
        tracing::info!(incident = incident.id(), %from, to = %next, "incident closed");
        self.record(
            incident,
            EventType::StateChanged,
            format!("{from} -> {next}"),
            Some(json!({ "from": from, "to": next })),
        );
        let event_type = if next == IncidentState::Resolved {
            EventType::Resolved
        } else {
            EventType::Failed
        };
        self.record(
            incident,
            event_type,
            incident.resolution_summary().unwrap_or_default().to_string(),
            None,
        );
        self.notify(incident);
        Ok(())
    }

    fn notify(&self, incident: &Incident) {
        if let Some(observer) = &self.observer {
            observer.incident_updated(incident);
        }
    }

    /// Audit writes never stop the pipeline.
    fn record(
        &self,
        incident: &Incident,
        event_type: EventType,
        description: impl Into<String>,
        details: Option<Value>,
    ) {
        let Some(log) = &self.log else {
            return;
        };
        let event = Event::now(incident.id(), event_type, description, details);
        if let Err(err) = log.append(&event) {
            tracing::warn!(incident = incident.id(), %err, "failed to append event");
        }
    }
}
