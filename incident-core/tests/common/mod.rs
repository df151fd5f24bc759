#![allow(dead_code)]

use async_trait::async_trait;
use incident_core::approval::{
    ApprovalChannel, ApprovalDecision, ApprovalRequest, ApprovalStore, ChannelError,
};
use incident_core::executor::{Verification, Verifier};
use incident_core::llm::{EngineError, ReasoningEngine, ReasoningPrompt};
use incident_core::orchestrator::Capabilities;
use incident_core::runner::{CommandOutput, RunnerError, StepRunner};
use incident_core::evidence::StaticEvidence;
use incident_core::{Incident, IncidentObserver, IncidentState, Orchestrator, PipelineConfig};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replies queued per system preamble. A preamble with nothing queued fails
/// like an unreachable model.
#[derive(Default)]
pub struct ScriptedEngine {
    replies: Mutex<HashMap<String, VecDeque<String>>>,
    prompts: Mutex<Vec<ReasoningPrompt>>,
}

impl ScriptedEngine {
    pub fn reply(self, preamble: &str, text: impl Into<String>) -> Self {
        self.replies
            .lock()
            .expect("replies lock")
            .entry(preamble.to_string())
            .or_default()
            .push_back(text.into());
        self
    }

    pub fn prompts_for(&self, preamble: &str) -> Vec<String> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .iter()
            .filter(|p| p.system == preamble)
            .map(|p| p.user.clone())
            .collect()
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn complete(&self, prompt: &ReasoningPrompt) -> Result<String, EngineError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.clone());
        self.replies
            .lock()
            .expect("replies lock")
            .get_mut(&prompt.system)
            .and_then(VecDeque::pop_front)
            .ok_or(EngineError::Disabled)
    }
}

/// Answers each published request with the next scripted decision; `None`
/// stays silent so the wait times out.
pub struct ScriptedApprover {
    store: ApprovalStore,
    decisions: Mutex<VecDeque<Option<ApprovalDecision>>>,
    requests: Mutex<Vec<ApprovalRequest>>,
}

impl ScriptedApprover {
    pub fn new(store: ApprovalStore, decisions: Vec<Option<ApprovalDecision>>) -> Self {
        Self {
            store,
            decisions: Mutex::new(decisions.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl ApprovalChannel for ScriptedApprover {
    async fn publish(&self, request: &ApprovalRequest) -> Result<(), ChannelError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let next = self
            .decisions
            .lock()
            .expect("decisions lock")
            .pop_front()
            .flatten();
        if let Some(decision) = next {
            self.store.resolve(request.id, decision);
        }
        Ok(())
    }
}

pub struct FailingChannel;

#[async_trait]
impl ApprovalChannel for FailingChannel {
    async fn publish(&self, _request: &ApprovalRequest) -> Result<(), ChannelError> {
        Err(ChannelError::Rejected("chat workspace unreachable".into()))
    }
}

/// Fails any command containing "fail" and records everything it ran.
#[derive(Default)]
pub struct ScriptedRunner {
    commands: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("commands lock").clone()
    }
}

#[async_trait]
impl StepRunner for ScriptedRunner {
    async fn run(&self, command: &str, _timeout: Duration) -> Result<CommandOutput, RunnerError> {
        self.commands
            .lock()
            .expect("commands lock")
            .push(command.to_string());
        let success = !command.contains("fail");
        Ok(CommandOutput {
            success,
            stdout: format!("ran: {command}"),
            stderr: (!success).then(|| format!("simulated failure for {command}")),
        })
    }
}

pub struct FixedVerifier(pub bool);

#[async_trait]
impl Verifier for FixedVerifier {
    async fn verify(&self, _incident: &Incident) -> Verification {
        Verification {
            resolved: self.0,
            detail: if self.0 {
                "Node worker-node-1 is Ready".into()
            } else {
                "Node worker-node-1 is still NotReady".into()
            },
        }
    }
}

/// Keeps every snapshot the orchestrator publishes.
#[derive(Default)]
pub struct SnapshotRecorder {
    snapshots: Mutex<Vec<Incident>>,
}

impl SnapshotRecorder {
    pub fn states(&self) -> Vec<IncidentState> {
        self.snapshots().iter().map(Incident::state).collect()
    }

    pub fn snapshots(&self) -> Vec<Incident> {
        self.snapshots.lock().expect("snapshots").clone()
    }
}

impl IncidentObserver for SnapshotRecorder {
    fn incident_updated(&self, incident: &Incident) {
        self.snapshots
            .lock()
            .expect("snapshots")
            .push(incident.clone());
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub engine: Arc<ScriptedEngine>,
    pub runner: Arc<ScriptedRunner>,
}

pub fn config(approval_timeout_secs: u64) -> PipelineConfig {
    PipelineConfig {
        approval_timeout_secs,
        ..PipelineConfig::default()
    }
}

pub fn harness(
    engine: ScriptedEngine,
    channel: Arc<dyn ApprovalChannel>,
    store: ApprovalStore,
    config: &PipelineConfig,
) -> Harness {
    let engine = Arc::new(engine);
    let runner = Arc::new(ScriptedRunner::default());
    let caps = Capabilities {
        engine: engine.clone(),
        evidence: Arc::new(StaticEvidence),
        runner: runner.clone(),
        verifier: Arc::new(FixedVerifier(true)),
        channel,
    };
    Harness {
        orchestrator: Orchestrator::new(caps, config, store),
        engine,
        runner,
    }
}

pub fn db_path(name: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    format!("/tmp/incident-pipeline-tests/{name}-{nanos}.db")
}

pub fn node_not_ready_payload() -> serde_json::Value {
    serde_json::json!({
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
        }],
        "groupLabels": {"alertname": "KubeNodeNotReady"}
    })
}

pub const NODE_ANALYSIS: &str = r#"{
    "component": "worker-node-1",
    "description": "kubelet stopped posting node status after disk pressure",
    "evidence": ["Ready=False", "DiskPressure=True"],
    "confidence": 0.8
}"#;

pub fn plan_json(title: &str, commands: &[&str]) -> String {
    let steps: Vec<_> = commands
        .iter()
        .map(|command| {
            serde_json::json!({
                "description": format!("run {command}"),
                "command": command,
                "expected_outcome": "command succeeds",
                "risk_level": "medium"
            })
        })
        .collect();
    serde_json::json!({
        "title": title,
        "description": "remediate the node",
        "impact_assessment": "pods on the node are rescheduled",
        "estimated_time": "10 minutes",
        "steps": steps
    })
    .to_string()
}
