use anyhow::{Context, Result};
use incident_core::approval::ApprovalStore;
use incident_core::event_log::EventLog;
use incident_core::llm::{DisabledEngine, ReasoningEngine, RigEngine};
use incident_core::{Capabilities, Orchestrator, PipelineConfig};
use incident_server::AppState;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = PipelineConfig::load().context("load pipeline config")?;
    let log = EventLog::open(&config.event_log_path)
        .with_context(|| format!("open event log {}", config.event_log_path))?;

    let engine: Arc<dyn ReasoningEngine> = match RigEngine::from_config(&config.llm) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            tracing::warn!(
                %err,
                "reasoning engine unavailable, every stage will use its fallback"
            );
            Arc::new(DisabledEngine)
        }
    };

    let caps = Capabilities::from_config(&config, engine);
    let orchestrator =
        Orchestrator::new(caps, &config, ApprovalStore::new()).with_event_log(log.clone());
    let state = AppState::new(orchestrator, Some(log), config.snapshot_retention());
    let app = incident_server::router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("bind {}", config.listen_addr))?;
    info!(
        addr = %config.listen_addr,
        model = %config.llm.model,
        execute_commands = config.execute_commands,
        approval_timeout_secs = config.approval_timeout_secs,
        "incident-server listening"
    );
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}
