use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;

use crate::AppState;
use crate::models::query::{QueryContext, QueryScope};
use crate::relay::format_envelope;
use crate::slack::{EventPayload, SlackError};

const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const SIGNATURE_HEADER: &str = "x-slack-signature";
const RETRY_HEADER: &str = "x-slack-retry-num";

/// Slack Events API endpoint.
///
/// Slack wants an acknowledgement within three seconds, so questions are
/// answered on a background task and the reply is posted in the thread.
pub async fn events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, (StatusCode, String)> {
    let Some(bot) = state.slack.clone() else {
        return Err((StatusCode::NOT_FOUND, "slack events are not configured".to_string()));
    };

    let header = |name: &'static str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .ok_or(SlackError::MissingHeader(name))
    };
    header(TIMESTAMP_HEADER)
        .and_then(|ts| {
            let sig = header(SIGNATURE_HEADER)?;
            bot.verify(ts, sig, &body, chrono::Utc::now().timestamp())
        })
        .map_err(|e| {
            tracing::warn!("rejected slack request: {e}");
            (StatusCode::UNAUTHORIZED, e.to_string())
        })?;

    let payload: EventPayload = serde_json::from_slice(&body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid slack payload: {e}")))?;

    match payload {
        EventPayload::UrlVerification { challenge } => {
            Ok(Json(serde_json::json!({ "challenge": challenge })).into_response())
        }
        EventPayload::EventCallback { event } => {
            // A redelivery means the first attempt is already being answered.
            if headers.contains_key(RETRY_HEADER) {
                tracing::debug!("ignoring slack redelivery of {} event", event.kind);
                return Ok(StatusCode::OK.into_response());
            }
            let Some(question) = event.question() else {
                return Ok(StatusCode::OK.into_response());
            };

            let orchestrator = state.orchestrator.clone();
            tokio::spawn(async move {
                let envelope = orchestrator
                    .answer(
                        &question.text,
                        QueryScope::Combined,
                        QueryContext::default(),
                        &CancellationToken::new(),
                    )
                    .await;
                if let Err(e) = bot.reply(&question, &format_envelope(&envelope)).await {
                    tracing::warn!("request {}: slack reply failed: {e}", envelope.request_id);
                }
            });
            Ok(StatusCode::OK.into_response())
        }
        EventPayload::Other => Ok(StatusCode::OK.into_response()),
    }
}
