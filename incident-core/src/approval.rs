//! Human approval of remediation plans.
//!
//! [`ApprovalStore`] is the only state shared between a pipeline waiting on a
//! decision and the inbound handler that records one. Each request slot holds
//! a oneshot pair: the callback side takes the sender, the waiting side takes
//! the receiver, and whichever side finishes the wait removes the slot.

use crate::error::IncidentError;
use crate::llm::{ReasoningEngine, ReasoningPrompt};
use crate::model::{Incident, RiskLevel};
use crate::prompts::APPROVAL_PREAMBLE;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

pub type ApprovalId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

/// What an approver sent back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub decision: Decision,
    pub user: String,
    /// Defaults to the first plan when approving.
    #[serde(default)]
    pub plan_index: Option<usize>,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl ApprovalDecision {
    pub fn approve(user: impl Into<String>, plan_index: usize) -> Self {
        Self {
            decision: Decision::Approve,
            user: user.into(),
            plan_index: Some(plan_index),
            feedback: None,
        }
    }

    pub fn reject(user: impl Into<String>, feedback: impl Into<String>) -> Self {
        Self {
            decision: Decision::Reject,
            user: user.into(),
            plan_index: None,
            feedback: Some(feedback.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Approved {
        plan_index: usize,
        approver: String,
        feedback: Option<String>,
    },
    Rejected {
        approver: String,
        feedback: Option<String>,
    },
    TimedOut,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveStatus {
    Resolved,
    /// A decision was already recorded; this one is ignored.
    AlreadyResolved,
    /// No such request, or it already finished or timed out.
    Unknown,
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("incident {0} already has an approval request outstanding")]
    AlreadyPending(String),
    #[error("no approval request {0}")]
    UnknownRequest(ApprovalId),
    #[error("approval request {0} is already being awaited")]
    AlreadyAwaited(ApprovalId),
}

struct Slot {
    incident_id: String,
    sender: Option<oneshot::Sender<ApprovalDecision>>,
    receiver: Option<oneshot::Receiver<ApprovalDecision>>,
}

#[derive(Clone, Default)]
pub struct ApprovalStore {
    slots: Arc<Mutex<HashMap<ApprovalId, Slot>>>,
}

impl ApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ApprovalId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a request slot. One outstanding request per incident.
    pub fn register(&self, incident_id: &str) -> Result<ApprovalId, ApprovalError> {
        let mut slots = self.slots();
        if slots.values().any(|s| s.incident_id == incident_id) {
            return Err(ApprovalError::AlreadyPending(incident_id.to_string()));
        }

        let id = Uuid::new_v4();
        let (sender, receiver) = oneshot::channel();
        slots.insert(
            id,
            Slot {
                incident_id: incident_id.to_string(),
                sender: Some(sender),
                receiver: Some(receiver),
            },
        );
        Ok(id)
    }

    /// Record a decision. Only the first one for a request counts.
    pub fn resolve(&self, id: ApprovalId, decision: ApprovalDecision) -> ResolveStatus {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&id) else {
            return ResolveStatus::Unknown;
        };
        let Some(sender) = slot.sender.take() else {
            return ResolveStatus::AlreadyResolved;
        };
        match sender.send(decision) {
            Ok(()) => ResolveStatus::Resolved,
            Err(_) => {
                slots.remove(&id);
                ResolveStatus::Unknown
            }
        }
    }

    /// Wait for a decision for at most `timeout`; `None` means it timed out.
    /// The slot is gone when this returns, whatever the outcome.
    pub async fn await_resolution(
        &self,
        id: ApprovalId,
        timeout: Duration,
    ) -> Result<Option<ApprovalDecision>, ApprovalError> {
        let mut receiver = {
            let mut slots = self.slots();
            let slot = slots.get_mut(&id).ok_or(ApprovalError::UnknownRequest(id))?;
            slot.receiver
                .take()
                .ok_or(ApprovalError::AlreadyAwaited(id))?
        };

        let waited = tokio::time::timeout(timeout, &mut receiver).await;

        // Removing under the lock closes the race with a late `resolve`: a
        // decision sent before this point is still in the receiver.
        let mut slots = self.slots();
        slots.remove(&id);
        match waited {
            Ok(Ok(decision)) => Ok(Some(decision)),
            Ok(Err(_)) => Ok(None),
            Err(_) => Ok(receiver.try_recv().ok()),
        }
    }

    pub fn cancel(&self, id: ApprovalId) {
        self.slots().remove(&id);
    }

    /// True while the request exists and has no decision yet.
    pub fn is_pending(&self, id: ApprovalId) -> bool {
        self.slots()
            .get(&id)
            .is_some_and(|slot| slot.sender.is_some())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub index: usize,
    pub title: String,
    pub max_risk: Option<RiskLevel>,
    pub step_count: usize,
    pub estimated_time: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApprovalAction {
    pub action_id: String,
    pub label: String,
}

/// Everything an approval surface needs to render one request.
#[derive(Clone, Debug, Serialize)]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    pub incident_id: String,
    pub alert_name: String,
    /// Fixed-format text naming every plan as `PLAN #n`.
    pub digest: String,
    /// Reader-facing wording; the digest when no engine is available.
    pub message: String,
    pub plans: Vec<PlanSummary>,
    pub actions: Vec<ApprovalAction>,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint answered {0}")]
    Status(reqwest::StatusCode),
    #[error("{0}")]
    Rejected(String),
}

/// Outbound side of approvals.
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    async fn publish(&self, request: &ApprovalRequest) -> Result<(), ChannelError>;

    /// Tell the surface the request is finished. Best effort.
    async fn close(
        &self,
        _request: &ApprovalRequest,
        _outcome: &ApprovalOutcome,
    ) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Writes requests to the log; decisions arrive over the HTTP callback.
#[derive(Clone, Debug, Default)]
pub struct LogApprovalChannel;

#[async_trait]
impl ApprovalChannel for LogApprovalChannel {
    async fn publish(&self, request: &ApprovalRequest) -> Result<(), ChannelError> {
        tracing::info!(
            approval_id = %request.id,
            incident = %request.incident_id,
            plans = request.plans.len(),
            "approval requested: POST /approvals/{} to decide\n{}",
            request.id,
            request.message
        );
        Ok(())
    }

    async fn close(
        &self,
        request: &ApprovalRequest,
        outcome: &ApprovalOutcome,
    ) -> Result<(), ChannelError> {
        tracing::info!(approval_id = %request.id, ?outcome, "approval closed");
        Ok(())
    }
}

/// Posts requests and closures as JSON to an external notification hook.
pub struct WebhookApprovalChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookApprovalChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    async fn post(&self, body: serde_json::Value) -> Result<(), ChannelError> {
        let response = self.client.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(ChannelError::Status(response.status()));
        }
        Ok(())
    }
}

#[async_trait]
impl ApprovalChannel for WebhookApprovalChannel {
    async fn publish(&self, request: &ApprovalRequest) -> Result<(), ChannelError> {
        self.post(serde_json::json!({
            "type": "approval_request",
            "request": request,
        }))
        .await
    }

    async fn close(
        &self,
        request: &ApprovalRequest,
        outcome: &ApprovalOutcome,
    ) -> Result<(), ChannelError> {
        self.post(serde_json::json!({
            "type": "approval_closed",
            "id": request.id,
            "incident_id": request.incident_id,
            "outcome": outcome,
        }))
        .await
    }
}

/// Deterministic digest of the incident, its root cause, and every plan.
pub fn approval_digest(incident: &Incident) -> String {
    let alert = incident.primary_alert();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Incident {}: {} ({})",
        incident.id(),
        alert.labels.alertname,
        alert.labels.severity.as_str()
    );
    let _ = writeln!(out, "{}", alert.annotations.summary);

    match incident.root_cause_analysis() {
        Some(rca) => {
            let _ = writeln!(
                out,
                "\nRoot cause: {} (confidence {:.0}%)\n{}",
                rca.component,
                rca.confidence * 100.0,
                rca.description
            );
        }
        None => out.push_str("\nRoot cause: not determined\n"),
    }

    for (index, plan) in incident.remediation_plans().iter().enumerate() {
        let risk = plan.max_risk().map_or("n/a", |r| r.as_str());
        let _ = writeln!(out, "\nPLAN #{}: {}", index + 1, plan.title);
        let _ = writeln!(
            out,
            "Risk: {risk} | Estimated time: {}",
            plan.estimated_time
        );
        let _ = writeln!(out, "Impact: {}", plan.impact_assessment);
        for (n, step) in plan.steps.iter().enumerate() {
            match &step.command {
                Some(command) => {
                    let _ = writeln!(out, "  {}. {} `{command}`", n + 1, step.description);
                }
                None => {
                    let _ = writeln!(out, "  {}. {}", n + 1, step.description);
                }
            }
        }
    }
    out
}

pub struct ApprovalGate {
    store: ApprovalStore,
    channel: Arc<dyn ApprovalChannel>,
    engine: Arc<dyn ReasoningEngine>,
    timeout: Duration,
}

impl ApprovalGate {
    pub fn new(
        store: ApprovalStore,
        channel: Arc<dyn ApprovalChannel>,
        engine: Arc<dyn ReasoningEngine>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            channel,
            engine,
            timeout,
        }
    }

    pub fn store(&self) -> &ApprovalStore {
        &self.store
    }

    /// Register and publish a request covering all of the incident's plans.
    /// If publishing fails the registration is withdrawn.
    pub async fn submit(&self, incident: &Incident) -> Result<ApprovalRequest, IncidentError> {
        if incident.remediation_plans().is_empty() {
            return Err(IncidentError::NoPlansToApprove(incident.id().to_string()));
        }

        let id = self.store.register(incident.id())?;
        let digest = approval_digest(incident);
        let message = self.phrase(incident.id(), &digest).await;

        let request = ApprovalRequest {
            id,
            incident_id: incident.id().to_string(),
            alert_name: incident.primary_alert().labels.alertname.clone(),
            digest,
            message,
            plans: incident
                .remediation_plans()
                .iter()
                .enumerate()
                .map(|(index, plan)| PlanSummary {
                    index,
                    title: plan.title.clone(),
                    max_risk: plan.max_risk(),
                    step_count: plan.steps.len(),
                    estimated_time: plan.estimated_time.clone(),
                })
                .collect(),
            actions: ["approve", "reject", "details"]
                .into_iter()
                .map(|kind| ApprovalAction {
                    action_id: format!("{kind}_{id}"),
                    label: kind.to_string(),
                })
                .collect(),
        };

        if let Err(err) = self.channel.publish(&request).await {
            self.store.cancel(id);
            return Err(err.into());
        }
        Ok(request)
    }

    /// Block until a decision arrives or the timeout passes.
    pub async fn wait(&self, request: &ApprovalRequest) -> Result<ApprovalOutcome, IncidentError> {
        let outcome = match self
            .store
            .await_resolution(request.id, self.timeout)
            .await?
        {
            None => ApprovalOutcome::TimedOut,
            Some(d) => match d.decision {
                Decision::Approve => ApprovalOutcome::Approved {
                    plan_index: d.plan_index.unwrap_or(0),
                    approver: d.user,
                    feedback: d.feedback,
                },
                Decision::Reject => ApprovalOutcome::Rejected {
                    approver: d.user,
                    feedback: d.feedback,
                },
            },
        };

        if let Err(err) = self.channel.close(request, &outcome).await {
            tracing::warn!(approval_id = %request.id, %err, "failed to close approval request");
        }
        Ok(outcome)
    }

    pub async fn request_approval(
        &self,
        incident: &Incident,
    ) -> Result<ApprovalOutcome, IncidentError> {
        let request = self.submit(incident).await?;
        self.wait(&request).await
    }

    async fn phrase(&self, incident_id: &str, digest: &str) -> String {
        let prompt = ReasoningPrompt::new(
            APPROVAL_PREAMBLE,
            format!("Write an approval request for this incident:\n\n{digest}"),
        );
        match self.engine.complete(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => digest.to_string(),
            Err(err) => {
                tracing::debug!(incident = incident_id, %err, "using plain approval digest");
                digest.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::DisabledEngine;
    use crate::model::tests::{node_not_ready_alert, plan, step};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    #[tokio::test]
    async fn decision_before_wait_is_delivered() {
        let store = ApprovalStore::new();
        let id = store.register("INC-1").expect("register");
        assert!(store.is_pending(id));
        assert_eq!(
            store.resolve(id, ApprovalDecision::approve("alice", 1)),
            ResolveStatus::Resolved
        );
        assert!(!store.is_pending(id));

        let decision = store
            .await_resolution(id, Duration::from_secs(1))
            .await
            .expect("await");
        assert_eq!(decision.and_then(|d| d.plan_index), Some(1));
    }

    #[tokio::test]
    async fn duplicate_callback_does_not_change_outcome() {
        let store = ApprovalStore::new();
        let id = store.register("INC-1").expect("register");
        assert_eq!(
            store.resolve(id, ApprovalDecision::approve("alice", 0)),
            ResolveStatus::Resolved
        );
        assert_eq!(
            store.resolve(id, ApprovalDecision::approve("alice", 0)),
            ResolveStatus::AlreadyResolved
        );
        assert_eq!(
            store.resolve(id, ApprovalDecision::reject("bob", "no")),
            ResolveStatus::AlreadyResolved
        );

        let decision = store
            .await_resolution(id, Duration::from_secs(1))
            .await
            .expect("await")
            .expect("decision");
        assert_eq!(decision.user, "alice");
        assert_eq!(decision.decision, Decision::Approve);
    }

    #[tokio::test]
    async fn one_outstanding_request_per_incident() {
        let store = ApprovalStore::new();
        let id = store.register("INC-1").expect("register");
        assert!(matches!(
            store.register("INC-1"),
            Err(ApprovalError::AlreadyPending(_))
        ));
        store.register("INC-2").expect("other incident");
        store.cancel(id);
        store.register("INC-1").expect("after cancel");
    }

    #[tokio::test]
    async fn timeout_returns_promptly_and_late_callback_is_ignored() {
        let store = ApprovalStore::new();
        let id = store.register("INC-1").expect("register");

        let started = Instant::now();
        let decision = store
            .await_resolution(id, Duration::from_secs(1))
            .await
            .expect("await");
        let elapsed = started.elapsed();

        assert_eq!(decision, None);
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
        assert_eq!(
            store.resolve(id, ApprovalDecision::approve("alice", 0)),
            ResolveStatus::Unknown
        );
        store.register("INC-1").expect("slot was cleaned up");
    }

    #[tokio::test]
    async fn callback_from_another_task_wakes_the_waiter() {
        let store = ApprovalStore::new();
        let id = store.register("INC-1").expect("register");
        let callback = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            callback.resolve(id, ApprovalDecision::reject("bob", "too risky"));
        });

        let decision = store
            .await_resolution(id, Duration::from_secs(5))
            .await
            .expect("await")
            .expect("decision");
        assert_eq!(decision.feedback.as_deref(), Some("too risky"));
    }

    #[tokio::test]
    async fn second_waiter_is_refused() {
        let store = ApprovalStore::new();
        let id = store.register("INC-1").expect("register");
        let waiter = store.clone();
        let first = tokio::spawn(async move {
            waiter
                .await_resolution(id, Duration::from_millis(200))
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(
            store.await_resolution(id, Duration::from_millis(10)).await,
            Err(ApprovalError::AlreadyAwaited(_))
        ));
        assert!(first.await.expect("join").expect("await").is_none());
    }

    struct CountingChannel {
        published: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ApprovalChannel for CountingChannel {
        async fn publish(&self, _request: &ApprovalRequest) -> Result<(), ChannelError> {
            self.published.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ChannelError::Rejected("workspace archived".into()));
            }
            Ok(())
        }
    }

    fn incident_with_plans() -> Incident {
        let restart = step("restart", Some("systemctl restart kubelet"));
        let drain = step("drain", Some("kubectl drain worker-node-1"));
        let mut incident = Incident::open(node_not_ready_alert()).expect("open");
        incident
            .replace_plans(vec![
                plan("Restart kubelet", vec![restart]),
                plan("Drain node", vec![drain]),
            ])
            .expect("plans");
        incident
    }

    fn gate(channel: Arc<CountingChannel>, timeout: Duration) -> ApprovalGate {
        ApprovalGate::new(
            ApprovalStore::new(),
            channel,
            Arc::new(DisabledEngine),
            timeout,
        )
    }

    #[test]
    fn digest_numbers_every_plan() {
        let digest = approval_digest(&incident_with_plans());
        assert!(digest.contains("PLAN #1: Restart kubelet"));
        assert!(digest.contains("PLAN #2: Drain node"));
        assert!(digest.contains("`kubectl drain worker-node-1`"));
    }

    #[tokio::test]
    async fn submit_without_plans_is_an_error() {
        let channel = Arc::new(CountingChannel {
            published: AtomicUsize::new(0),
            fail: false,
        });
        let gate = gate(channel.clone(), Duration::from_secs(1));
        let incident = Incident::open(node_not_ready_alert()).expect("open");
        assert!(matches!(
            gate.submit(&incident).await,
            Err(IncidentError::NoPlansToApprove(_))
        ));
        assert_eq!(channel.published.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn publish_failure_withdraws_registration() {
        let channel = Arc::new(CountingChannel {
            published: AtomicUsize::new(0),
            fail: true,
        });
        let gate = gate(channel, Duration::from_secs(1));
        let incident = incident_with_plans();
        assert!(matches!(
            gate.submit(&incident).await,
            Err(IncidentError::Channel(_))
        ));
        gate.store().register(incident.id()).expect("slot released");
    }

    #[tokio::test]
    async fn request_lists_plans_by_index() {
        let channel = Arc::new(CountingChannel {
            published: AtomicUsize::new(0),
            fail: false,
        });
        let gate = gate(channel, Duration::from_secs(1));
        let incident = incident_with_plans();
        let request = gate.submit(&incident).await.expect("submit");

        assert_eq!(request.message, request.digest);
        assert_eq!(request.plans[1].index, 1);
        assert_eq!(
            request.plans[1].title,
            incident.remediation_plans()[1].title
        );
        assert_eq!(
            request.actions[0].action_id,
            format!("approve_{}", request.id)
        );

        gate.store()
            .resolve(request.id, ApprovalDecision::approve("alice", 1));
        assert_eq!(
            gate.wait(&request).await.expect("wait"),
            ApprovalOutcome::Approved {
                plan_index: 1,
                approver: "alice".into(),
                feedback: None,
            }
        );
    }

    #[tokio::test]
    async fn silent_approver_times_out() {
        let channel = Arc::new(CountingChannel {
            published: AtomicUsize::new(0),
            fail: false,
        });
        let gate = gate(channel, Duration::from_secs(1));
        let started = Instant::now();
        let outcome = gate
            .request_approval(&incident_with_plans())
            .await
            .expect("request");
        assert_eq!(outcome, ApprovalOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    /// Accepts a single HTTP request, answers with `status`, and yields the
    /// JSON body it received.
    async fn hook_answering(status: &'static str) -> (String, JoinHandle<serde_json::Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("http://{}/hook", listener.local_addr().expect("addr"));
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            let body = loop {
                let n = socket.read(&mut buf).await.expect("read");
                assert!(n > 0, "connection closed before the body arrived");
                raw.extend_from_slice(&buf[..n]);
                let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&raw[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                let start = end + 4;
                if raw.len() >= start + length {
                    break raw[start..start + length].to_vec();
                }
            };
            let reply = format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\n\r\n");
            socket.write_all(reply.as_bytes()).await.expect("write");
            serde_json::from_slice(&body).expect("json body")
        });
        (url, handle)
    }

    fn direct_client() -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("client")
    }

    async fn submitted_request() -> ApprovalRequest {
        let channel = Arc::new(CountingChannel {
            published: AtomicUsize::new(0),
            fail: false,
        });
        gate(channel, Duration::from_secs(1))
            .submit(&incident_with_plans())
            .await
            .expect("submit")
    }

    #[tokio::test]
    async fn webhook_error_status_is_a_channel_error() {
        let request = submitted_request().await;
        let (url, hook) = hook_answering("500 Internal Server Error").await;
        let channel = WebhookApprovalChannel::with_client(direct_client(), url);

        let err = channel.publish(&request).await.expect_err("500 must fail");
        assert!(
            matches!(err, ChannelError::Status(code) if code.as_u16() == 500),
            "{err:?}"
        );
        let body = hook.await.expect("hook");
        assert_eq!(body["type"], "approval_request");
    }

    #[tokio::test]
    async fn webhook_posts_request_then_closure() {
        let request = submitted_request().await;

        let (url, hook) = hook_answering("200 OK").await;
        WebhookApprovalChannel::with_client(direct_client(), url)
            .publish(&request)
            .await
            .expect("publish");
        let body = hook.await.expect("hook");
        assert_eq!(body["type"], "approval_request");
        assert_eq!(body["request"]["id"], serde_json::json!(request.id));
        assert_eq!(body["request"]["incident_id"], request.incident_id.as_str());
        assert_eq!(body["request"]["plans"].as_array().map(Vec::len), Some(2));

        let (url, hook) = hook_answering("204 No Content").await;
        WebhookApprovalChannel::with_client(direct_client(), url)
            .close(&request, &ApprovalOutcome::TimedOut)
            .await
            .expect("close");
        let body = hook.await.expect("hook");
        assert_eq!(body["type"], "approval_closed");
        assert_eq!(body["id"], serde_json::json!(request.id));
        assert_eq!(body["outcome"]["outcome"], "timed_out");
    }
}
