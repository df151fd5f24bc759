use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use incident_core::approval::{ApprovalDecision, ResolveStatus};
use incident_core::event_log::{Event, EventLog, LogError};
use incident_core::Incident;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize)]
struct DecisionResponse {
    status: ResolveStatus,
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    active: bool,
}

#[derive(Deserialize)]
struct FeedParams {
    #[serde(default)]
    after: i64,
}

pub fn approvals_router() -> Router<AppState> {
    Router::new()
        .route("/approvals/:id", post(handle_decision))
        .route("/incidents", get(list_incidents))
        .route("/incidents/:id", get(get_incident))
        .route("/incidents/:id/timeline", get(get_timeline))
        .route("/events", get(get_events))
}

/// Inbound approver callback. Duplicate and late decisions are acknowledged
/// but change nothing.
async fn handle_decision(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(decision): Json<ApprovalDecision>,
) -> Json<DecisionResponse> {
    let user = decision.user.clone();
    let status = state.orchestrator.approvals().resolve(id, decision);
    tracing::info!(approval_id = %id, %user, ?status, "approval callback");
    Json(DecisionResponse { status })
}

async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Incident>, StatusCode> {
    state
        .incidents
        .get(&id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

fn event_log(state: &AppState) -> Result<&EventLog, StatusCode> {
    state.log.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

fn query_failed(what: &'static str) -> impl FnOnce(LogError) -> StatusCode {
    move |err| {
        tracing::warn!(%err, "{what} query failed");
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Incident ids from the audit log, newest activity first, or only those not
/// yet resolved or failed with `?active=true`.
async fn list_incidents(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<String>>, StatusCode> {
    let log = event_log(&state)?;
    let ids = if params.active {
        log.active_incidents()
    } else {
        log.all_incidents()
    };
    ids.map(Json).map_err(query_failed("incident list"))
}

async fn get_timeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Event>>, StatusCode> {
    let events = event_log(&state)?
        .events_for_incident(&id)
        .map_err(query_failed("timeline"))?;
    if events.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(events))
}

/// Audit events across all incidents with ids greater than `?after=`, for
/// clients that poll the log incrementally.
async fn get_events(
    State(state): State<AppState>,
    Query(params): Query<FeedParams>,
) -> Result<Json<Vec<Event>>, StatusCode> {
    event_log(&state)?
        .events_after(params.after)
        .map(Json)
        .map_err(query_failed("event feed"))
}
