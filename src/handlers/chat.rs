use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tokio_util::sync::CancellationToken;

use super::status_for_envelope;
use crate::AppState;
use crate::models::api::ChatRequest;

/// Answer a natural-language question.
///
/// If the client disconnects, axum drops this future; the drop guard then
/// cancels the token and in-flight LLM and backend calls stop.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query must not be empty".to_string()));
    }

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let envelope = state
        .orchestrator
        .answer(&req.query, req.scope, req.context, &cancel)
        .await;

    if req.relay {
        match &state.relay {
            Some(relay) => {
                if let Err(e) = relay.post(&envelope).await {
                    tracing::warn!("request {}: slack relay failed: {e}", envelope.request_id);
                }
            }
            None => tracing::warn!("relay requested but no slack webhook is configured"),
        }
    }

    guard.disarm();
    Ok((status_for_envelope(&envelope), Json(envelope)))
}
