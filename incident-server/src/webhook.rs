use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

pub fn webhook_router() -> Router<AppState> {
    Router::new().route("/webhook/alertmanager", post(handle_alertmanager))
}

fn bad_request(error: String) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": error })))
}

/// Validates the payload, opens an incident and runs it in the background.
async fn handle_alertmanager(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::warn!(%rejection, "unreadable alert payload");
            return bad_request(rejection.body_text());
        }
    };

    let mut incident = match state.orchestrator.create_incident(&payload) {
        Ok(incident) => incident,
        Err(err) => {
            tracing::warn!(%err, "rejected alert payload");
            return bad_request(err.to_string());
        }
    };

    let id = incident.id().to_string();
    tokio::spawn(async move {
        if let Err(err) = state.orchestrator.run(&mut incident).await {
            tracing::error!(
                incident = incident.id(),
                state = %incident.state(),
                %err,
                "pipeline stopped"
            );
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "incident_id": id })))
}
