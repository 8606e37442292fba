use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tokio_util::sync::CancellationToken;

use super::status_for_error;
use crate::AppState;
use crate::models::api::{ExplainRequest, ExplainResponse, TranslateParams};
use crate::models::envelope::ErrorDetail;
use crate::models::query::{QueryContext, QueryLanguage, TranslatedQuery};

fn parse_language(raw: &str) -> Result<QueryLanguage, (StatusCode, Json<serde_json::Value>)> {
    raw.parse().map_err(|e: String| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "message": e })),
        )
    })
}

fn detail_response(detail: ErrorDetail) -> (StatusCode, Json<serde_json::Value>) {
    let status = status_for_error(detail.kind);
    (
        status,
        Json(serde_json::to_value(detail).unwrap_or(serde_json::Value::Null)),
    )
}

/// Translate a question into PromQL or LogQL without running it.
pub async fn translate(
    State(state): State<AppState>,
    Query(params): Query<TranslateParams>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let language = parse_language(&params.language)?;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let translated = state
        .orchestrator
        .translate(&params.query, language, QueryContext::new(), &cancel)
        .await
        .map_err(detail_response)?;
    Ok(Json(translated))
}

/// Explain an existing query in plain language.
pub async fn explain(
    State(state): State<AppState>,
    Json(req): Json<ExplainRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let language = parse_language(&req.language)?;
    let query = TranslatedQuery::new(req.query, language);
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let explanation = state
        .orchestrator
        .explain(&query, &cancel)
        .await
        .map_err(detail_response)?;
    Ok(Json(ExplainResponse {
        query: query.text,
        language,
        explanation,
    }))
}
