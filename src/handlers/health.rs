use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::AppState;

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Ready only when every configured backend answers its readiness check.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let backends = state.orchestrator.readiness(&cancel).await;
    let ready = backends.iter().all(|b| b.ready);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if ready { "ready" } else { "degraded" },
            "backends": backends,
        })),
    )
}
