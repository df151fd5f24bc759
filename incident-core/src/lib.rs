//! Alert-to-remediation pipeline for Kubernetes incidents.
//!
//! An [`Incident`] moves through investigation, planning, human approval and
//! execution under the control of an [`Orchestrator`]. The reasoning engine,
//! evidence sources, command runner and approval channel are injected as
//! trait objects so each can be replaced or simulated.

pub mod analyzer;
pub mod approval;
pub mod config;
pub mod error;
pub mod event_log;
pub mod evidence;
pub mod executor;
pub mod llm;
pub mod model;
pub mod orchestrator;
pub mod planner;
pub mod prompts;
pub mod runner;
pub mod state;

pub use config::PipelineConfig;
pub use error::{IncidentError, StageOutcome};
pub use model::Incident;
pub use orchestrator::{Capabilities, IncidentObserver, Orchestrator};
pub use state::IncidentState;
