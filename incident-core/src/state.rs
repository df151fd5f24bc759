//! Incident lifecycle states and the transition table.
//!
//! `next_action` is a pure function of the current state and the signal the
//! last completed stage produced. The orchestrator applies its answer; no
//! other component moves an incident between states.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    Received,
    Investigating,
    Analyzed,
    Planning,
    ApprovalPending,
    Executing,
    Resolved,
    Failed,
}

impl IncidentState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Investigating => "investigating",
            Self::Analyzed => "analyzed",
            Self::Planning => "planning",
            Self::ApprovalPending => "approval_pending",
            Self::Executing => "executing",
            Self::Resolved => "resolved",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for IncidentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completed-work signal handed back to the orchestrator between stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Nothing pending; move a resting state forward.
    Dispatch,
    AnalysisReturned,
    PlansReturned,
    Approved { plan_index: usize },
    Rejected { feedback: String },
    /// Stop waiting for approval and give up on the incident.
    Abandoned { reason: String },
    ExecutionComplete { success: bool },
}

impl Signal {
    fn name(&self) -> &'static str {
        match self {
            Signal::Dispatch => "dispatch",
            Signal::AnalysisReturned => "analysis_returned",
            Signal::PlansReturned => "plans_returned",
            Signal::Approved { .. } => "approved",
            Signal::Rejected { .. } => "rejected",
            Signal::Abandoned { .. } => "abandoned",
            Signal::ExecutionComplete { .. } => "execution_complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Investigate,
    RecordAnalysis,
    Plan { feedback: Option<String> },
    RequestApproval,
    Execute { plan_index: usize },
    Finalize { summary: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub action: Action,
    pub next: IncidentState,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition from {from}: {detail}")]
pub struct IllegalTransition {
    pub from: IncidentState,
    pub detail: String,
}

impl IllegalTransition {
    pub(crate) fn between(from: IncidentState, to: IncidentState) -> Self {
        Self {
            from,
            detail: format!("cannot move to {to}"),
        }
    }
}

/// Legal edges of the lifecycle graph:
/// ```text
/// Received        → Investigating
/// Investigating   → Analyzed
/// Analyzed        → Planning
/// Planning        → ApprovalPending
/// ApprovalPending → Executing | Planning | Failed
/// Executing       → Resolved | Failed
/// ```
pub fn is_legal_transition(from: IncidentState, to: IncidentState) -> bool {
    use IncidentState::*;

    matches!(
        (from, to),
        (Received, Investigating)
            | (Investigating, Analyzed)
            | (Analyzed, Planning)
            | (Planning, ApprovalPending)
            | (ApprovalPending, Executing)
            | (ApprovalPending, Planning)
            | (ApprovalPending, Failed)
            | (Executing, Resolved)
            | (Executing, Failed)
    )
}

pub fn next_action(state: IncidentState, signal: &Signal) -> Result<Transition, IllegalTransition> {
    use IncidentState::*;

    let (action, next) = match (state, signal) {
        (Received, Signal::Dispatch) => (Action::Investigate, Investigating),
        (Investigating, Signal::AnalysisReturned) => (Action::RecordAnalysis, Analyzed),
        (Analyzed, Signal::Dispatch) => (Action::Plan { feedback: None }, Planning),
        (Planning, Signal::PlansReturned) => (Action::RequestApproval, ApprovalPending),
        (ApprovalPending, Signal::Approved { plan_index }) => (
            Action::Execute {
                plan_index: *plan_index,
            },
            Executing,
        ),
        (ApprovalPending, Signal::Rejected { feedback }) => (
            Action::Plan {
                feedback: Some(feedback.clone()),
            },
            Planning,
        ),
        (ApprovalPending, Signal::Abandoned { reason }) => (
            Action::Finalize {
                summary: Some(reason.clone()),
            },
            Failed,
        ),
        (Executing, Signal::ExecutionComplete { success: true }) => {
            (Action::Finalize { summary: None }, Resolved)
        }
        (Executing, Signal::ExecutionComplete { success: false }) => {
            (Action::Finalize { summary: None }, Failed)
        }
        (from, signal) => {
            return Err(IllegalTransition {
                from,
                detail: format!("no transition on signal '{}'", signal.name()),
            })
        }
    };

    debug_assert!(is_legal_transition(state, next));
    Ok(Transition { action, next })
}
