//! Diagnostic context gathered for an incident before analysis.

use crate::model::Incident;
use crate::runner::StepRunner;
use alert_schema::AlertLabels;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Category name (`node_logs`, `pod_status`, ...) to payload.
pub type Evidence = BTreeMap<String, Value>;

/// What the evidence is about, picked from the primary alert's labels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvidenceScope {
    Node { name: String },
    Pod { namespace: String, name: String },
    Deployment { namespace: String, name: String },
}

impl EvidenceScope {
    /// Node wins over pod, pod over deployment. Pods and deployments need a
    /// namespace.
    pub fn from_labels(labels: &AlertLabels) -> Option<Self> {
        if let Some(name) = &labels.node {
            return Some(Self::Node { name: name.clone() });
        }
        let namespace = labels.namespace.as_ref()?;
        if let Some(name) = &labels.pod {
            return Some(Self::Pod {
                namespace: namespace.clone(),
                name: name.clone(),
            });
        }
        labels.deployment.as_ref().map(|name| Self::Deployment {
            namespace: namespace.clone(),
            name: name.clone(),
        })
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Node { .. } => "node",
            Self::Pod { .. } => "pod",
            Self::Deployment { .. } => "deployment",
        }
    }
}

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("{0}")]
    Command(String),
    #[error("unparseable output: {0}")]
    Parse(#[from] serde_json::Error),
}

#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn logs(&self, scope: &EvidenceScope) -> Result<Value, EvidenceError>;
    async fn metrics(&self, scope: &EvidenceScope) -> Result<Value, EvidenceError>;
    async fn status(&self, scope: &EvidenceScope) -> Result<Value, EvidenceError>;
}

/// Canned data shaped like what a live cluster would return.
#[derive(Clone, Debug, Default)]
pub struct StaticEvidence;

#[async_trait]
impl EvidenceSource for StaticEvidence {
    async fn logs(&self, scope: &EvidenceScope) -> Result<Value, EvidenceError> {
        let lines = match scope {
            EvidenceScope::Node { name } => vec![
                format!("kubelet[{name}]: PLEG is not healthy: last seen active 3m12s ago"),
                format!("kubelet[{name}]: Node {name} status is now: NodeNotReady"),
                "containerd: failed to reserve sandbox name: context deadline exceeded".into(),
            ],
            EvidenceScope::Pod { name, .. } => vec![
                format!("{name}: starting server on :8080"),
                format!("{name}: fatal: connection refused dialing database:5432"),
                "Back-off restarting failed container".into(),
            ],
            EvidenceScope::Deployment { name, .. } => vec![
                format!("deployment/{name}: ReplicaSet has timed out progressing"),
                format!("deployment/{name}: 1 of 3 updated replicas are available"),
            ],
        };
        Ok(json!(lines))
    }

    async fn metrics(&self, scope: &EvidenceScope) -> Result<Value, EvidenceError> {
        Ok(match scope {
            EvidenceScope::Node { .. } => json!({
                "cpu_usage_percent": 97.5,
                "memory_usage_percent": 91.2,
                "disk_pressure": true,
                "pods_running": 38,
            }),
            EvidenceScope::Pod { .. } => json!({
                "restarts_last_hour": 14,
                "cpu_millicores": 12,
                "memory_mib": 48,
            }),
            EvidenceScope::Deployment { .. } => json!({
                "replicas_desired": 3,
                "replicas_available": 1,
            }),
        })
    }

    async fn status(&self, scope: &EvidenceScope) -> Result<Value, EvidenceError> {
        Ok(match scope {
            EvidenceScope::Node { name } => json!({
                "name": name,
                "conditions": [
                    {"type": "Ready", "status": "False", "reason": "KubeletNotReady"},
                    {"type": "DiskPressure", "status": "True"},
                    {"type": "MemoryPressure", "status": "False"},
                ],
            }),
            EvidenceScope::Pod { namespace, name } => json!({
                "name": name,
                "namespace": namespace,
                "phase": "Running",
                "containerStatuses": [
                    {
                        "ready": false,
                        "restartCount": 14,
                        "state": {"waiting": {"reason": "CrashLoopBackOff"}},
                    },
                ],
            }),
            EvidenceScope::Deployment { namespace, name } => json!({
                "name": name,
                "namespace": namespace,
                "replicas": 3,
                "availableReplicas": 1,
                "unavailableReplicas": 2,
            }),
        })
    }
}

/// Reads evidence from the cluster through `kubectl`.
pub struct KubectlEvidence {
    runner: Arc<dyn StepRunner>,
    timeout: Duration,
}

impl KubectlEvidence {
    pub fn new(runner: Arc<dyn StepRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    async fn kubectl(&self, args: &[&str]) -> Result<String, EvidenceError> {
        let mut command = String::from("kubectl");
        for arg in args {
            let quoted = shlex::try_quote(arg)
                .map_err(|e| EvidenceError::Command(format!("bad argument {arg:?}: {e}")))?;
            command.push(' ');
            command.push_str(&quoted);
        }

        let out = self
            .runner
            .run(&command, self.timeout)
            .await
            .map_err(|e| EvidenceError::Command(e.to_string()))?;
        if !out.success {
            return Err(EvidenceError::Command(
                out.stderr.unwrap_or_else(|| format!("{command} failed")),
            ));
        }
        Ok(out.stdout)
    }
}

fn lines(raw: &str) -> Value {
    json!(raw.lines().map(str::to_string).collect::<Vec<_>>())
}

#[async_trait]
impl EvidenceSource for KubectlEvidence {
    async fn logs(&self, scope: &EvidenceScope) -> Result<Value, EvidenceError> {
        let raw = match scope {
            EvidenceScope::Node { name } => {
                let selector = format!("involvedObject.kind=Node,involvedObject.name={name}");
                let args: [&str; 5] = ["get", "events", "-A", "--field-selector", &selector];
                self.kubectl(&args).await?
            }
            EvidenceScope::Pod { namespace, name } => {
                let args: [&str; 5] = ["logs", "-n", namespace, name, "--tail=100"];
                self.kubectl(&args).await?
            }
            EvidenceScope::Deployment { namespace, name } => {
                let target = format!("deployment/{name}");
                let args: [&str; 5] = ["logs", "-n", namespace, &target, "--tail=100"];
                self.kubectl(&args).await?
            }
        };
        Ok(lines(&raw))
    }

    async fn metrics(&self, scope: &EvidenceScope) -> Result<Value, EvidenceError> {
        let raw = match scope {
            EvidenceScope::Node { name } => self.kubectl(&["top", "node", name]).await?,
            EvidenceScope::Pod { namespace, name } => {
                self.kubectl(&["top", "pod", "-n", namespace, name]).await?
            }
            EvidenceScope::Deployment { namespace, name } => {
                let selector = format!("app={name}");
                let args: [&str; 6] = ["top", "pod", "-n", namespace, "-l", &selector];
                self.kubectl(&args).await?
            }
        };
        Ok(lines(&raw))
    }

    /// The object's `status` block from `kubectl get -o json`.
    async fn status(&self, scope: &EvidenceScope) -> Result<Value, EvidenceError> {
        let (kind, namespace, name) = match scope {
            EvidenceScope::Node { name } => ("node", None, name),
            EvidenceScope::Pod { namespace, name } => ("pod", Some(namespace), name),
            EvidenceScope::Deployment { namespace, name } => ("deployment", Some(namespace), name),
        };
        let mut args = vec!["get", kind, name.as_str(), "-o", "json"];
        if let Some(namespace) = namespace {
            args.extend(["-n", namespace.as_str()]);
        }

        let raw = self.kubectl(&args).await?;
        let mut object: Value = serde_json::from_str(&raw)?;
        Ok(object
            .get_mut("status")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}

pub struct EvidenceCollector {
    source: Arc<dyn EvidenceSource>,
}

impl EvidenceCollector {
    pub fn new(source: Arc<dyn EvidenceSource>) -> Self {
        Self { source }
    }

    /// Never fails: a category whose fetch errored is reported under
    /// `<prefix>_<category>_error` instead.
    pub async fn collect(&self, incident: &Incident) -> Evidence {
        let mut evidence = Evidence::new();
        let Some(scope) = EvidenceScope::from_labels(&incident.primary_alert().labels) else {
            tracing::debug!(incident = incident.id(), "no evidence scope in alert labels");
            return evidence;
        };
        let prefix = scope.prefix();

        let fetched = [
            ("logs", self.source.logs(&scope).await),
            ("metrics", self.source.metrics(&scope).await),
            ("status", self.source.status(&scope).await),
        ];
        for (category, result) in fetched {
            match result {
                Ok(payload) => {
                    evidence.insert(format!("{prefix}_{category}"), payload);
                }
                Err(err) => {
                    tracing::warn!(
                        incident = incident.id(),
                        category,
                        %err,
                        "evidence fetch failed"
                    );
                    evidence.insert(
                        format!("{prefix}_{category}_error"),
                        Value::String(err.to_string()),
                    );
                }
            }
        }
        evidence
    }
}
