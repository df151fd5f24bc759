use crate::approval::{ApprovalError, ChannelError};
use crate::state::IllegalTransition;
use alert_schema::SchemaError;
use thiserror::Error;

/// Errors that end a pipeline run. Stage-level recoverable failures never
/// surface here; they come back as [`StageOutcome::Fallback`].
#[derive(Debug, Error)]
pub enum IncidentError {
    #[error("invalid alert payload: {0}")]
    InvalidAlert(#[from] SchemaError),
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
    #[error("incident {0} is terminal")]
    Terminal(String),
    #[error("root cause analysis already recorded for incident {0}")]
    AnalysisAlreadyRecorded(String),
    #[error("incident {0} has no remediation plans to approve")]
    NoPlansToApprove(String),
    #[error("incident {0} has no approved plan")]
    NoApprovedPlan(String),
    #[error("plan index {index} out of range ({available} plans)")]
    PlanIndexOutOfRange { index: usize, available: usize },
    #[error("{0} stage returned no result")]
    MissingStageResult(&'static str),
    #[error("approval store: {0}")]
    Approval(#[from] ApprovalError),
    #[error("approval channel: {0}")]
    Channel(#[from] ChannelError),
}

/// Result of a stage that calls the reasoning engine.
///
/// `Fallback` still carries a usable value so the pipeline can continue.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Produced(T),
    Fallback { value: T, reason: String },
}

impl<T> StageOutcome<T> {
    pub fn value(&self) -> &T {
        match self {
            StageOutcome::Produced(value) | StageOutcome::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            StageOutcome::Produced(value) | StageOutcome::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, StageOutcome::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            StageOutcome::Produced(_) => None,
            StageOutcome::Fallback { reason, .. } => Some(reason),
        }
    }
}
